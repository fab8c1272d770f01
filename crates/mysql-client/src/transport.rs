//! Byte transports a connection can run over.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{Error, Result};

/// A bidirectional byte stream: TCP, a Unix socket, or TLS over either.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased transport owned by the driver task.
pub type BoxedTransport = Box<dyn Transport>;

/// Open the socket described by `config`, bounded by the connect timeout.
///
/// Returns the transport and whether it is a local Unix socket.
pub(crate) async fn open(config: &Config) -> Result<(BoxedTransport, bool)> {
    let connect_timeout = config.timeouts.connect_timeout;

    if let Some(path) = &config.socket {
        return open_unix(path, connect_timeout).await;
    }

    let addr = format!("{}:{}", config.host, config.port);
    tracing::debug!(addr = %addr, "opening TCP connection");
    let stream = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::ConnectionTimeout)??;
    stream.set_nodelay(true)?;
    Ok((Box::new(stream), false))
}

#[cfg(unix)]
async fn open_unix(
    path: &std::path::Path,
    connect_timeout: std::time::Duration,
) -> Result<(BoxedTransport, bool)> {
    tracing::debug!(path = %path.display(), "opening Unix socket connection");
    let stream = timeout(connect_timeout, tokio::net::UnixStream::connect(path))
        .await
        .map_err(|_| Error::ConnectionTimeout)??;
    Ok((Box::new(stream), true))
}

#[cfg(not(unix))]
async fn open_unix(
    path: &std::path::Path,
    _connect_timeout: std::time::Duration,
) -> Result<(BoxedTransport, bool)> {
    Err(Error::Config(format!(
        "Unix sockets are not supported on this platform: {}",
        path.display()
    )))
}
