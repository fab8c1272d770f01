//! Connection phase: initial handshake, optional TLS upgrade and
//! authentication.
//!
//! ```text
//! client                                server
//!   |  <-------- HandshakeV10 (seq 0) -----|
//!   |  --------- SSLRequest (seq 1) ------>|   only with TLS
//!   |  ========= TLS handshake ===========>|
//!   |  --------- HandshakeResponse ------->|
//!   |  <-------- AuthSwitch / MoreData ----|   zero or more rounds
//!   |  <-------- OK -----------------------|
//! ```

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use mysql_auth::{AuthExchange, AuthOptions, AuthPlugin, AuthStep};
use mysql_codec::{Packet, PacketCodec, PacketStream};
use mysql_protocol::handshake::{AUTH_MORE_DATA_HEADER, AUTH_SWITCH_HEADER};
use mysql_protocol::packet::{ERR_HEADER, OK_HEADER};
use mysql_protocol::{
    AuthMoreData, AuthSwitchRequest, CapabilityFlags, ErrPacket, HandshakeResponse, HandshakeV10,
    OkPacket, ProtocolError,
};
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::ConnectionMetadata;
use crate::state::ConnectionState;
use crate::transport::{self, BoxedTransport};

/// An authenticated session, ready for the command phase.
pub(crate) struct Session {
    pub(crate) stream: PacketStream<BoxedTransport>,
    pub(crate) capabilities: CapabilityFlags,
    pub(crate) metadata: ConnectionMetadata,
}

/// Capabilities requested before intersecting with the server's.
pub(crate) fn requested_capabilities(config: &Config) -> CapabilityFlags {
    let mut caps = CapabilityFlags::client_default() | CapabilityFlags::CONNECT_ATTRS;
    if config.database.is_some() {
        caps |= CapabilityFlags::CONNECT_WITH_DB;
    }
    if config.compression {
        caps |= CapabilityFlags::COMPRESS;
    }
    if config.local_infile {
        caps |= CapabilityFlags::LOCAL_FILES;
    }
    caps
}

/// Open the socket and run the connection phase.
///
/// The socket connect is bounded by `connect_timeout` and everything after
/// it by `login_timeout`. `state` ends in `Ready` on success.
pub(crate) async fn establish(config: &Config, state: &mut ConnectionState) -> Result<Session> {
    config.validate()?;
    state.transition(ConnectionState::Connecting)?;

    let (transport, local_socket) = transport::open(config).await?;
    timeout(
        config.timeouts.login_timeout,
        login(config, transport, local_socket, state),
    )
    .await
    .map_err(|_| Error::ConnectionTimeout)?
}

async fn login(
    config: &Config,
    transport: BoxedTransport,
    local_socket: bool,
    state: &mut ConnectionState,
) -> Result<Session> {
    let codec = PacketCodec::with_max_packet_size(config.max_packet_size as usize);
    let mut stream = PacketStream::with_codec(transport, codec);

    let mut payload = read_packet(&mut stream).await?.payload;
    if payload.first() == Some(&ERR_HEADER) {
        return Err(handshake_error(payload));
    }
    let handshake = HandshakeV10::decode(&mut payload)?;
    state.transition(ConnectionState::Established)?;
    tracing::debug!(
        server_version = %handshake.server_version,
        connection_id = handshake.connection_id,
        auth_plugin = ?handshake.auth_plugin,
        "received initial handshake"
    );

    if !handshake.capabilities.contains(CapabilityFlags::PROTOCOL_41) {
        return Err(Error::Connection(format!(
            "server {} does not support protocol 4.1",
            handshake.server_version
        )));
    }

    let mut capabilities = requested_capabilities(config) & handshake.capabilities;
    let (mut stream, tls_active) = negotiate_tls(config, stream, capabilities, &handshake).await?;
    if tls_active {
        capabilities |= CapabilityFlags::SSL;
    }

    let plugin_name = handshake
        .auth_plugin
        .as_deref()
        .unwrap_or(AuthPlugin::NativePassword.name());
    let plugin = AuthPlugin::from_name(plugin_name)?;
    let mut exchange = AuthExchange::new(
        config.credentials.clone(),
        plugin,
        handshake.auth_seed.clone(),
        AuthOptions {
            secure: tls_active || local_socket,
            server_public_key: config.server_public_key.clone(),
            key_cache: config.rsa_key_cache.clone(),
        },
    );

    let response = HandshakeResponse {
        capabilities,
        max_packet_size: config.max_packet_size,
        charset: config.charset,
        username: config.credentials.username().to_owned(),
        auth_response: exchange.initial_response()?,
        database: config.database.clone(),
        auth_plugin: Some(plugin.name().to_owned()),
        attributes: config.connect_attributes(),
    };
    let mut buf = BytesMut::new();
    response.encode(&mut buf);
    stream.send(buf.freeze()).await?;

    let ok = authenticate(&mut stream, &mut exchange, capabilities).await?;
    state.transition(ConnectionState::Ready)?;

    if capabilities.contains(CapabilityFlags::COMPRESS) {
        stream.codec_mut().enable_compression();
    }

    let mut metadata = ConnectionMetadata {
        server_version: handshake.server_version,
        connection_id: handshake.connection_id,
        charset: config.charset,
        capabilities,
        ..ConnectionMetadata::default()
    };
    metadata.record_ok(&ok);

    tracing::info!(
        address = %config.address(),
        connection_id = metadata.connection_id,
        server_version = %metadata.server_version,
        tls = tls_active,
        compression = capabilities.contains(CapabilityFlags::COMPRESS),
        "connected to MySQL server"
    );

    Ok(Session {
        stream,
        capabilities,
        metadata,
    })
}

/// Drive the auth plugin until the server accepts or rejects the login.
async fn authenticate(
    stream: &mut PacketStream<BoxedTransport>,
    exchange: &mut AuthExchange,
    capabilities: CapabilityFlags,
) -> Result<OkPacket> {
    loop {
        let mut payload = read_packet(stream).await?.payload;
        match payload.first().copied() {
            Some(OK_HEADER) => return Ok(OkPacket::decode(&mut payload, capabilities)?),
            Some(ERR_HEADER) => return Err(handshake_error(payload)),
            Some(AUTH_SWITCH_HEADER) => {
                let switch = AuthSwitchRequest::decode(&mut payload)?;
                tracing::debug!(plugin = %switch.plugin_name, "server requested auth plugin switch");
                let response = exchange.switch_plugin(&switch.plugin_name, &switch.plugin_data)?;
                stream.send(response).await?;
            }
            Some(AUTH_MORE_DATA_HEADER) => {
                let more = AuthMoreData::decode(&mut payload)?;
                match exchange.more_data(&more.data)? {
                    AuthStep::Send(data) => stream.send(data).await?,
                    AuthStep::Wait => {}
                }
            }
            Some(header) => {
                return Err(ProtocolError::UnexpectedPacket {
                    header,
                    context: "authentication",
                }
                .into());
            }
            None => return Err(ProtocolError::UnexpectedEof.into()),
        }
    }
}

#[cfg(feature = "tls")]
async fn negotiate_tls(
    config: &Config,
    mut stream: PacketStream<BoxedTransport>,
    capabilities: CapabilityFlags,
    handshake: &HandshakeV10,
) -> Result<(PacketStream<BoxedTransport>, bool)> {
    use mysql_protocol::SslRequest;
    use mysql_protocol::handshake::SSL_REQUEST_SIZE;
    use mysql_tls::{TlsConnector, TlsError};
    use tokio_util::codec::FramedParts;

    let Some(tls) = &config.tls else {
        return Ok((stream, false));
    };

    if !handshake.capabilities.contains(CapabilityFlags::SSL) {
        if tls.mode.requires_tls() {
            return Err(TlsError::NotSupportedByServer.into());
        }
        tracing::warn!("server does not support TLS, continuing without encryption");
        return Ok((stream, false));
    }

    let connector = TlsConnector::new(tls.clone())?;

    let request = SslRequest {
        capabilities,
        max_packet_size: config.max_packet_size,
        charset: config.charset,
    };
    let mut buf = BytesMut::with_capacity(SSL_REQUEST_SIZE);
    request.encode(&mut buf);
    stream.send(buf.freeze()).await?;

    tracing::debug!(mode = ?tls.mode, "upgrading connection to TLS");
    let parts = stream.into_parts();
    let tls_stream = connector.connect(parts.io, &config.host).await?;

    // The codec keeps its sequence counter across the swap.
    let io: BoxedTransport = Box::new(tls_stream);
    let mut upgraded = FramedParts::new::<Bytes>(io, parts.codec);
    upgraded.read_buf = parts.read_buf;
    upgraded.write_buf = parts.write_buf;
    Ok((PacketStream::from_parts(upgraded), true))
}

#[cfg(not(feature = "tls"))]
async fn negotiate_tls(
    _config: &Config,
    stream: PacketStream<BoxedTransport>,
    _capabilities: CapabilityFlags,
    _handshake: &HandshakeV10,
) -> Result<(PacketStream<BoxedTransport>, bool)> {
    Ok((stream, false))
}

async fn read_packet(stream: &mut PacketStream<BoxedTransport>) -> Result<Packet> {
    Ok(stream.next().await.ok_or(Error::ConnectionClosed)??)
}

fn handshake_error(mut payload: Bytes) -> Error {
    match ErrPacket::decode(&mut payload) {
        Ok(err) => Error::Handshake {
            code: err.code,
            state: err.sql_state,
            message: err.message,
        },
        Err(err) => err.into(),
    }
}
