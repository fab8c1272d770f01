//! Mock MySQL server for unit testing.
//!
//! This module provides a scripted MySQL server that can be used for
//! testing the driver without a real database instance.
//!
//! ## Features
//!
//! - Handshake v10 with several authentication flows
//! - Optional TLS upgrade using a generated self-signed certificate
//! - Optional compressed protocol
//! - Configurable responses for text queries and prepared statements,
//!   including multi-result responses and errors in the middle of rows
//! - Records queries, statement executions and handshakes for assertions
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_testing::mock_server::{MockMySqlServer, MockResponse};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = MockMySqlServer::builder()
//!         .with_response("SELECT 1 AS a", MockResponse::scalar("a", 1))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let port = server.port();
//!     // Connect your client to 127.0.0.1:port...
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use mysql_auth::plugin::{cleartext, scramble_caching_sha2, scramble_native};
use mysql_codec::{PacketCodec, PacketStream};
use mysql_protocol::codec::{read_null_terminated_string, write_lenenc_int};
use mysql_protocol::handshake::{AUTH_MORE_DATA_HEADER, SSL_REQUEST_SIZE};
use mysql_protocol::packet::{EOF_HEADER, LOCAL_INFILE_HEADER};
use mysql_protocol::statement::decode_send_long_data;
use mysql_protocol::{
    AuthSwitchRequest, CapabilityFlags, ColumnDefinition, ColumnType, Command, EofPacket,
    ErrPacket, ExecuteRequest, HandshakeResponse, HandshakeV10, OkPacket, PrepareOk, StatusFlags,
    charset,
};
use mysql_types::{SqlValue, decode_binary_value, encode_binary_row, encode_text_row};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_util::codec::FramedParts;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] mysql_codec::CodecError),

    /// Malformed client packet.
    #[error("protocol error: {0}")]
    Protocol(#[from] mysql_protocol::ProtocolError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The client closed the connection mid-exchange.
    #[error("client disconnected")]
    Disconnected,
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// A result set.
    Rows {
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Row data.
        rows: Vec<Vec<SqlValue>>,
    },

    /// An OK packet (INSERT/UPDATE/DELETE, DDL, SET ...).
    Ok {
        /// Affected row count.
        affected_rows: u64,
        /// Last insert id.
        last_insert_id: u64,
    },

    /// An ERR packet.
    Error {
        /// MySQL error code.
        code: u16,
        /// SQLSTATE.
        state: String,
        /// Error message.
        message: String,
    },

    /// Column definitions and rows, then an ERR packet instead of the
    /// terminator.
    RowsThenError {
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Rows sent before the error.
        rows: Vec<Vec<SqlValue>>,
        /// MySQL error code.
        code: u16,
        /// Error message.
        message: String,
    },

    /// A result set whose rows are sent one at a time, `interval` apart.
    SlowRows {
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Row data.
        rows: Vec<Vec<SqlValue>>,
        /// Pause before each row.
        interval: Duration,
    },

    /// Several results chained with `SERVER_MORE_RESULTS_EXISTS`.
    Multi(Vec<MockResponse>),

    /// Ask the client for a local file, then answer OK with the number of
    /// lines received as the affected row count.
    LocalInfile(String),

    /// Close the socket without answering.
    Disconnect,

    /// Compute the response from the SQL text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", &columns.len())
                .field("rows", &rows.len())
                .finish(),
            Self::Ok {
                affected_rows,
                last_insert_id,
            } => f
                .debug_struct("Ok")
                .field("affected_rows", affected_rows)
                .field("last_insert_id", last_insert_id)
                .finish(),
            Self::Error { code, message, .. } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::RowsThenError { rows, code, .. } => f
                .debug_struct("RowsThenError")
                .field("rows", &rows.len())
                .field("code", code)
                .finish(),
            Self::SlowRows { rows, interval, .. } => f
                .debug_struct("SlowRows")
                .field("rows", &rows.len())
                .field("interval", interval)
                .finish(),
            Self::Multi(responses) => f.debug_tuple("Multi").field(responses).finish(),
            Self::LocalInfile(path) => f.debug_tuple("LocalInfile").field(path).finish(),
            Self::Disconnect => write!(f, "Disconnect"),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl MockResponse {
    /// One row with one column.
    pub fn scalar(name: &str, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        let (column_type, unsigned) = mysql_types::column_type_of(&value);
        let mut column = ColumnDefinition::new(name, column_type);
        if unsigned {
            column.flags |= mysql_protocol::ColumnFlags::UNSIGNED;
        }
        Self::Rows {
            columns: vec![column],
            rows: vec![vec![value]],
        }
    }

    /// A result set.
    pub fn rows(columns: Vec<ColumnDefinition>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// OK with no affected rows.
    pub fn ok() -> Self {
        Self::affected(0)
    }

    /// OK with an affected row count.
    pub fn affected(count: u64) -> Self {
        Self::Ok {
            affected_rows: count,
            last_insert_id: 0,
        }
    }

    /// OK for an insert that generated `id`.
    pub fn inserted(id: u64) -> Self {
        Self::Ok {
            affected_rows: 1,
            last_insert_id: id,
        }
    }

    /// ERR with SQLSTATE `HY000`.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            state: "HY000".into(),
            message: message.into(),
        }
    }

    /// ERR with an explicit SQLSTATE.
    pub fn error_with_state(code: u16, state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            state: state.into(),
            message: message.into(),
        }
    }

    /// Build the response with a closure over the SQL text.
    pub fn custom(f: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    fn resolve(&self, sql: &str) -> MockResponse {
        match self {
            Self::Custom(f) => f(sql),
            other => other.clone(),
        }
    }

    /// Columns of the first result, as reported by COM_STMT_PREPARE.
    fn columns(&self) -> &[ColumnDefinition] {
        match self {
            Self::Rows { columns, .. }
            | Self::RowsThenError { columns, .. }
            | Self::SlowRows { columns, .. } => columns,
            Self::Multi(responses) => responses.first().map_or(&[], MockResponse::columns),
            _ => &[],
        }
    }
}

/// How the mock server authenticates clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// `mysql_native_password` from the start.
    #[default]
    NativePassword,
    /// `caching_sha2_password` with a cache hit (fast auth).
    CachingSha2Fast,
    /// `caching_sha2_password` with a cache miss: the password must be sent
    /// in clear text over TLS.
    CachingSha2Full,
    /// Advertise `caching_sha2_password`, then switch to
    /// `mysql_native_password` with a fresh seed.
    SwitchToNative,
    /// Switch to `mysql_clear_password`.
    ClearPassword,
}

impl AuthMode {
    fn advertised_plugin(self) -> &'static str {
        match self {
            Self::NativePassword | Self::ClearPassword => "mysql_native_password",
            Self::CachingSha2Fast | Self::CachingSha2Full | Self::SwitchToNative => {
                "caching_sha2_password"
            }
        }
    }
}

/// What the server learned from a client's handshake response.
#[derive(Debug, Clone)]
pub struct RecordedHandshake {
    /// Capabilities the client settled on.
    pub capabilities: CapabilityFlags,
    /// User name.
    pub username: String,
    /// Database from the handshake, if any.
    pub database: Option<String>,
    /// Auth plugin named by the client.
    pub auth_plugin: Option<String>,
    /// Connection attributes.
    pub attributes: Vec<(String, String)>,
    /// Whether the connection was upgraded to TLS.
    pub tls: bool,
}

/// One COM_STMT_EXECUTE as decoded by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedExecution {
    /// SQL the statement was prepared from.
    pub sql: String,
    /// Parameter values in slot order. Long data shows up as `Binary`.
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Default)]
struct Recorder {
    handshakes: Vec<RecordedHandshake>,
    queries: Vec<String>,
    prepares: Vec<String>,
    executions: Vec<RecordedExecution>,
    closed_statements: Vec<u32>,
    databases: Vec<String>,
    local_infile: Vec<Bytes>,
    commands: Vec<u8>,
}

/// Configuration for the mock MySQL server.
pub struct MockServerConfig {
    /// Pre-configured responses for specific SQL texts.
    responses: HashMap<String, MockResponse>,
    /// Response for everything else.
    default_response: MockResponse,
    /// Columns returned by COM_FIELD_LIST, per table.
    fields: HashMap<String, Vec<ColumnDefinition>>,
    /// Accepted user and password.
    user: String,
    password: String,
    auth: AuthMode,
    server_version: String,
    tls: bool,
    compression: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::ok(),
            fields: HashMap::new(),
            user: "root".into(),
            password: String::new(),
            auth: AuthMode::default(),
            server_version: "8.0.36-mock".into(),
            tls: false,
            compression: false,
        }
    }
}

impl MockServerConfig {
    fn capabilities(&self) -> CapabilityFlags {
        let mut caps = CapabilityFlags::client_default()
            | CapabilityFlags::CONNECT_WITH_DB
            | CapabilityFlags::CONNECT_ATTRS
            | CapabilityFlags::LOCAL_FILES;
        if self.tls {
            caps |= CapabilityFlags::SSL;
        }
        if self.compression {
            caps |= CapabilityFlags::COMPRESS;
        }
        caps
    }

    fn find_response(&self, sql: &str) -> MockResponse {
        self.responses
            .get(sql)
            .unwrap_or(&self.default_response)
            .resolve(sql)
    }
}

/// Builder for [`MockMySqlServer`].
#[derive(Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a specific SQL text.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Set the response for unmatched SQL (default: OK).
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Columns returned by COM_FIELD_LIST for `table`.
    pub fn with_fields(mut self, table: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        self.config.fields.insert(table.into(), columns);
        self
    }

    /// Accepted credentials (default: `root` with an empty password).
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user = user.into();
        self.config.password = password.into();
        self
    }

    /// Authentication flow.
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.config.auth = auth;
        self
    }

    /// Server version string sent in the handshake.
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.config.server_version = version.into();
        self
    }

    /// Offer TLS with a self-signed certificate for `localhost`.
    pub fn with_tls(mut self) -> Self {
        self.config.tls = true;
        self
    }

    /// Offer the compressed protocol.
    pub fn with_compression(mut self) -> Self {
        self.config.compression = true;
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockMySqlServer> {
        MockMySqlServer::start(self.config).await
    }
}

struct Shared {
    config: MockServerConfig,
    acceptor: Option<tokio_rustls::TlsAcceptor>,
    recorder: Mutex<Recorder>,
    connection_count: AtomicUsize,
    next_connection_id: AtomicU32,
}

/// A mock MySQL server for testing.
///
/// Listens on `127.0.0.1` with an ephemeral port. Every accepted connection
/// is served by its own task until the client quits or the server is
/// stopped.
pub struct MockMySqlServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    shared: Arc<Shared>,
    certificate_pem: Option<String>,
}

impl MockMySqlServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let (acceptor, certificate_pem) = if config.tls {
            let (acceptor, pem) = tls_acceptor()?;
            (Some(acceptor), Some(pem))
        } else {
            (None, None)
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            config,
            acceptor,
            recorder: Mutex::new(Recorder::default()),
            connection_count: AtomicUsize::new(0),
            next_connection_id: AtomicU32::new(1),
        });

        let mut shutdown_rx = shutdown_tx.subscribe();
        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, _peer)) => {
                            let shared = Arc::clone(&accept_shared);
                            let mut shutdown_rx = shutdown_rx.resubscribe();
                            tokio::spawn(async move {
                                shared.connection_count.fetch_add(1, Ordering::AcqRel);
                                tokio::select! {
                                    result = handle_connection(stream, &shared) => {
                                        if let Err(e) = result {
                                            tracing::debug!(error = %e, "mock connection ended with error");
                                        }
                                    }
                                    _ = shutdown_rx.recv() => {}
                                }
                                shared.connection_count.fetch_sub(1, Ordering::AcqRel);
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept error");
                            break;
                        }
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(Self {
            addr,
            shutdown_tx,
            shared,
            certificate_pem,
        })
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// PEM of the self-signed certificate when TLS is enabled.
    pub fn certificate_pem(&self) -> Option<&str> {
        self.certificate_pem.as_deref()
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.shared.connection_count.load(Ordering::Acquire)
    }

    /// Handshake responses received so far.
    pub async fn handshakes(&self) -> Vec<RecordedHandshake> {
        self.shared.recorder.lock().await.handshakes.clone()
    }

    /// COM_QUERY texts received so far.
    pub async fn queries(&self) -> Vec<String> {
        self.shared.recorder.lock().await.queries.clone()
    }

    /// COM_STMT_PREPARE texts received so far.
    pub async fn prepares(&self) -> Vec<String> {
        self.shared.recorder.lock().await.prepares.clone()
    }

    /// Statement executions received so far.
    pub async fn executions(&self) -> Vec<RecordedExecution> {
        self.shared.recorder.lock().await.executions.clone()
    }

    /// Ids passed to COM_STMT_CLOSE so far.
    pub async fn closed_statements(&self) -> Vec<u32> {
        self.shared.recorder.lock().await.closed_statements.clone()
    }

    /// Databases selected with COM_INIT_DB so far.
    pub async fn databases(&self) -> Vec<String> {
        self.shared.recorder.lock().await.databases.clone()
    }

    /// File contents received through `LOAD DATA LOCAL INFILE`.
    pub async fn local_infile_data(&self) -> Vec<Bytes> {
        self.shared.recorder.lock().await.local_infile.clone()
    }

    /// Command bytes received so far, in order.
    pub async fn commands(&self) -> Vec<u8> {
        self.shared.recorder.lock().await.commands.clone()
    }

    /// Stop the server and drop every open connection.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockMySqlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tls_acceptor() -> Result<(tokio_rustls::TlsAcceptor, String)> {
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()])
        .map_err(|e| MockServerError::Tls(e.to_string()))?;
    let pem = certified.cert.pem();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.signing_key.serialize_der()));

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MockServerError::Tls(e.to_string()))?
    .with_no_client_auth()
    .with_single_cert(vec![certified.cert.der().clone()], key)
    .map_err(|e| MockServerError::Tls(e.to_string()))?;
    Ok((tokio_rustls::TlsAcceptor::from(Arc::new(config)), pem))
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type Stream = PacketStream<Box<dyn Io>>;

/// A prepared statement on one mock connection.
struct MockStatement {
    sql: String,
    params: usize,
    long_data: HashMap<u16, BytesMut>,
}

/// Per-connection state.
struct Session<'a> {
    shared: &'a Shared,
    stream: Stream,
    capabilities: CapabilityFlags,
    statements: HashMap<u32, MockStatement>,
    next_statement_id: u32,
}

/// Seed bytes: printable, never NUL.
fn seed(connection_id: u32, round: u8) -> Bytes {
    (0..20u32)
        .map(|i| (((i * 7 + connection_id + u32::from(round) * 13) % 94) + 33) as u8)
        .collect()
}

/// Handle a single client connection.
async fn handle_connection(stream: TcpStream, shared: &Shared) -> Result<()> {
    let config = &shared.config;
    let connection_id = shared.next_connection_id.fetch_add(1, Ordering::AcqRel);
    let server_caps = config.capabilities();
    let auth_seed = seed(connection_id, 0);

    let io: Box<dyn Io> = Box::new(stream);
    let mut stream: Stream = PacketStream::with_codec(io, PacketCodec::new());

    let mut buf = BytesMut::new();
    HandshakeV10 {
        server_version: config.server_version.clone(),
        connection_id,
        auth_seed: auth_seed.clone(),
        capabilities: server_caps,
        charset: charset::UTF8MB4_GENERAL_CI,
        status: StatusFlags::AUTOCOMMIT,
        auth_plugin: Some(config.auth.advertised_plugin().into()),
    }
    .encode(&mut buf);
    stream.send(buf.freeze()).await?;

    let mut payload = read(&mut stream).await?;
    let mut tls = false;
    if payload.len() == SSL_REQUEST_SIZE {
        let Some(acceptor) = &shared.acceptor else {
            return Err(MockServerError::Tls("SSLRequest without TLS support".into()));
        };
        let parts = stream.into_parts();
        let tls_stream = acceptor.accept(parts.io).await?;
        let io: Box<dyn Io> = Box::new(tls_stream);
        let mut upgraded = FramedParts::new::<Bytes>(io, parts.codec);
        upgraded.read_buf = parts.read_buf;
        upgraded.write_buf = parts.write_buf;
        stream = PacketStream::from_parts(upgraded);
        tls = true;
        payload = read(&mut stream).await?;
    }

    let response = HandshakeResponse::decode(&mut payload)?;
    let capabilities = response.capabilities & (server_caps | CapabilityFlags::SSL);
    shared.recorder.lock().await.handshakes.push(RecordedHandshake {
        capabilities,
        username: response.username.clone(),
        database: response.database.clone(),
        auth_plugin: response.auth_plugin.clone(),
        attributes: response.attributes.clone(),
        tls,
    });

    let mut session = Session {
        shared,
        stream,
        capabilities,
        statements: HashMap::new(),
        next_statement_id: 1,
    };

    if !session
        .authenticate(&response, &auth_seed, connection_id, tls)
        .await?
    {
        let message = format!("Access denied for user '{}'@'localhost'", response.username);
        session.send_err(1045, "28000", &message).await?;
        return Ok(());
    }
    session.send_ok(0, 0, StatusFlags::AUTOCOMMIT).await?;
    if capabilities.contains(CapabilityFlags::COMPRESS) {
        session.stream.codec_mut().enable_compression();
    }

    session.serve().await
}

async fn read(stream: &mut Stream) -> Result<Bytes> {
    match stream.next().await {
        Some(packet) => Ok(packet?.payload),
        None => Err(MockServerError::Disconnected),
    }
}

impl Session<'_> {
    fn config(&self) -> &MockServerConfig {
        &self.shared.config
    }

    fn deprecate_eof(&self) -> bool {
        self.capabilities.contains(CapabilityFlags::DEPRECATE_EOF)
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        self.stream.send(payload).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes> {
        read(&mut self.stream).await
    }

    /// Run the configured authentication flow. Returns whether the client
    /// proved the password.
    async fn authenticate(
        &mut self,
        response: &HandshakeResponse,
        auth_seed: &[u8],
        connection_id: u32,
        tls: bool,
    ) -> Result<bool> {
        let (user, password) = (self.config().user.clone(), self.config().password.clone());
        if response.username != user {
            return Ok(false);
        }
        let client_data = &response.auth_response[..];
        let auth = self.config().auth;

        match auth {
            AuthMode::NativePassword => Ok(client_data == scramble_native(&password, auth_seed)),
            AuthMode::CachingSha2Fast => {
                if client_data != scramble_caching_sha2(&password, auth_seed) {
                    return Ok(false);
                }
                self.send(Bytes::from_static(&[AUTH_MORE_DATA_HEADER, 0x03])).await?;
                Ok(true)
            }
            AuthMode::CachingSha2Full => {
                self.send(Bytes::from_static(&[AUTH_MORE_DATA_HEADER, 0x04])).await?;
                let reply = self.read().await?;
                // Without TLS the client asks for the RSA key, which this
                // server does not have.
                Ok(tls && reply[..] == cleartext(&password)[..])
            }
            AuthMode::SwitchToNative => {
                let new_seed = seed(connection_id, 1);
                self.switch("mysql_native_password", &new_seed).await?;
                let reply = self.read().await?;
                Ok(reply[..] == scramble_native(&password, &new_seed)[..])
            }
            AuthMode::ClearPassword => {
                self.switch("mysql_clear_password", &[]).await?;
                let reply = self.read().await?;
                Ok(reply[..] == cleartext(&password)[..])
            }
        }
    }

    async fn switch(&mut self, plugin: &str, data: &[u8]) -> Result<()> {
        let mut plugin_data = BytesMut::from(data);
        plugin_data.put_u8(0);
        let mut buf = BytesMut::new();
        AuthSwitchRequest {
            plugin_name: plugin.into(),
            plugin_data: plugin_data.freeze(),
        }
        .encode(&mut buf);
        self.send(buf.freeze()).await
    }

    /// Command phase.
    async fn serve(&mut self) -> Result<()> {
        loop {
            self.stream.codec_mut().reset_sequence();
            let mut payload = match self.stream.next().await {
                Some(packet) => packet?.payload,
                None => return Ok(()),
            };
            if payload.is_empty() {
                continue;
            }
            let code = payload.get_u8();
            self.shared.recorder.lock().await.commands.push(code);

            match Command::from_u8(code) {
                Ok(Command::Quit) => return Ok(()),
                Ok(Command::Query) => {
                    let sql = String::from_utf8_lossy(&payload).into_owned();
                    tracing::debug!(sql = %sql, "mock query");
                    self.shared.recorder.lock().await.queries.push(sql.clone());
                    let response = self.config().find_response(&sql);
                    if !self.respond(response, false).await? {
                        return Ok(());
                    }
                }
                Ok(Command::InitDb) => {
                    let db = String::from_utf8_lossy(&payload).into_owned();
                    self.shared.recorder.lock().await.databases.push(db);
                    self.send_ok(0, 0, StatusFlags::AUTOCOMMIT).await?;
                }
                Ok(Command::FieldList) => {
                    let table = read_null_terminated_string(&mut payload)?;
                    self.field_list(&table).await?;
                }
                Ok(Command::Ping) => self.send_ok(0, 0, StatusFlags::AUTOCOMMIT).await?,
                Ok(Command::ResetConnection) => {
                    self.statements.clear();
                    self.send_ok(0, 0, StatusFlags::AUTOCOMMIT).await?;
                }
                Ok(Command::StmtPrepare) => {
                    let sql = String::from_utf8_lossy(&payload).into_owned();
                    self.prepare(sql).await?;
                }
                Ok(Command::StmtExecute) => {
                    let mut full = BytesMut::with_capacity(payload.len() + 1);
                    full.put_u8(code);
                    full.put_slice(&payload);
                    if !self.execute(full.freeze()).await? {
                        return Ok(());
                    }
                }
                Ok(Command::StmtSendLongData) => {
                    let mut full = BytesMut::with_capacity(payload.len() + 1);
                    full.put_u8(code);
                    full.put_slice(&payload);
                    let mut full = full.freeze();
                    let (id, param) = decode_send_long_data(&mut full)?;
                    if let Some(stmt) = self.statements.get_mut(&id) {
                        stmt.long_data.entry(param).or_default().put_slice(&full);
                    }
                }
                Ok(Command::StmtClose) => {
                    let id = payload.get_u32_le();
                    self.statements.remove(&id);
                    self.shared.recorder.lock().await.closed_statements.push(id);
                }
                Ok(Command::StmtReset) => {
                    let id = payload.get_u32_le();
                    match self.statements.get_mut(&id) {
                        Some(stmt) => {
                            stmt.long_data.clear();
                            self.send_ok(0, 0, StatusFlags::AUTOCOMMIT).await?;
                        }
                        None => self.unknown_statement(id).await?,
                    }
                }
                _ => {
                    self.send_err(1047, "08S01", "Unknown command").await?;
                }
            }
        }
    }

    async fn prepare(&mut self, sql: String) -> Result<()> {
        self.shared.recorder.lock().await.prepares.push(sql.clone());
        let response = self.config().find_response(&sql);
        if let MockResponse::Error { code, state, message } = &response {
            return self.send_err(*code, state, message).await;
        }
        let params = sql.matches('?').count();
        let columns = response.columns().to_vec();
        let statement_id = self.next_statement_id;
        self.next_statement_id += 1;

        let mut buf = BytesMut::new();
        PrepareOk {
            statement_id,
            num_columns: columns.len() as u16,
            num_params: params as u16,
            warnings: 0,
        }
        .encode(&mut buf);
        self.send(buf.freeze()).await?;

        let placeholders = vec![ColumnDefinition::new("?", ColumnType::VarString); params];
        self.send_definitions(&placeholders).await?;
        self.send_definitions(&columns).await?;

        self.statements.insert(
            statement_id,
            MockStatement {
                sql,
                params,
                long_data: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Column definitions plus the EOF that follows them on old clients.
    async fn send_definitions(&mut self, columns: &[ColumnDefinition]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        for column in columns {
            let mut buf = BytesMut::new();
            column.encode(&mut buf);
            self.send(buf.freeze()).await?;
        }
        if !self.deprecate_eof() {
            self.send_eof(StatusFlags::AUTOCOMMIT).await?;
        }
        Ok(())
    }

    async fn execute(&mut self, mut payload: Bytes) -> Result<bool> {
        let id = payload.get(1..5).map_or(0, |mut b| b.get_u32_le());
        let Some(stmt) = self.statements.get_mut(&id) else {
            self.unknown_statement(id).await?;
            return Ok(true);
        };
        let request = ExecuteRequest::decode(&mut payload, stmt.params)?;

        let mut values = request.values.clone();
        let mut params = Vec::with_capacity(stmt.params);
        for index in 0..stmt.params {
            let long_data = u16::try_from(index)
                .ok()
                .and_then(|i| stmt.long_data.remove(&i));
            if let Some(data) = long_data {
                params.push(SqlValue::Binary(data.freeze()));
            } else if request.is_null(index) {
                params.push(SqlValue::Null);
            } else {
                let (ty, unsigned) = request
                    .types
                    .get(index)
                    .copied()
                    .unwrap_or((ColumnType::VarString, false));
                let value = decode_binary_value(
                    &mut values,
                    ty,
                    unsigned,
                    u16::from(charset::UTF8MB4_GENERAL_CI),
                )
                .map_err(|e| MockServerError::Protocol(mysql_protocol::ProtocolError::InvalidField {
                    field: "execute parameter",
                    reason: e.to_string(),
                }))?;
                params.push(value);
            }
        }
        stmt.long_data.clear();

        let sql = stmt.sql.clone();
        self.shared
            .recorder
            .lock()
            .await
            .executions
            .push(RecordedExecution {
                sql: sql.clone(),
                params,
            });
        let response = self.config().find_response(&sql);
        self.respond(response, true).await
    }

    async fn field_list(&mut self, table: &str) -> Result<()> {
        let Some(columns) = self.config().fields.get(table).cloned() else {
            let message = format!("Table '{table}' doesn't exist");
            return self.send_err(1146, "42S02", &message).await;
        };
        for column in &columns {
            let mut buf = BytesMut::new();
            column.encode(&mut buf);
            self.send(buf.freeze()).await?;
        }
        self.send_terminator(StatusFlags::AUTOCOMMIT).await
    }

    /// Send a scripted response. Returns `false` when the connection should
    /// be dropped.
    async fn respond(&mut self, response: MockResponse, binary: bool) -> Result<bool> {
        let parts = match response {
            MockResponse::Multi(parts) => parts,
            single => vec![single],
        };
        let count = parts.len();
        for (i, part) in parts.into_iter().enumerate() {
            let mut status = StatusFlags::AUTOCOMMIT;
            if i + 1 < count {
                status |= StatusFlags::MORE_RESULTS_EXISTS;
            }
            match part {
                MockResponse::Rows { columns, rows } => {
                    self.send_result(&columns, &rows, binary).await?;
                    self.send_terminator(status).await?;
                }
                MockResponse::SlowRows {
                    columns,
                    rows,
                    interval,
                } => {
                    self.send_result(&columns, &[], binary).await?;
                    for row in &rows {
                        tokio::time::sleep(interval).await;
                        self.send_row(row, binary).await?;
                    }
                    self.send_terminator(status).await?;
                }
                MockResponse::Ok {
                    affected_rows,
                    last_insert_id,
                } => self.send_ok(affected_rows, last_insert_id, status).await?,
                MockResponse::Error { code, state, message } => {
                    // An error ends the whole response.
                    self.send_err(code, &state, &message).await?;
                    return Ok(true);
                }
                MockResponse::RowsThenError {
                    columns,
                    rows,
                    code,
                    message,
                } => {
                    self.send_result(&columns, &rows, binary).await?;
                    self.send_err(code, "HY000", &message).await?;
                    return Ok(true);
                }
                MockResponse::LocalInfile(path) => self.local_infile(&path, status).await?,
                MockResponse::Disconnect => return Ok(false),
                MockResponse::Multi(_) | MockResponse::Custom(_) => {
                    self.send_err(1105, "HY000", "unsupported nested mock response")
                        .await?;
                    return Ok(true);
                }
            }
        }
        Ok(true)
    }

    async fn send_result(
        &mut self,
        columns: &[ColumnDefinition],
        rows: &[Vec<SqlValue>],
        binary: bool,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        write_lenenc_int(&mut buf, columns.len() as u64);
        self.send(buf.freeze()).await?;
        self.send_definitions(columns).await?;
        for row in rows {
            self.send_row(row, binary).await?;
        }
        Ok(())
    }

    async fn send_row(&mut self, row: &[SqlValue], binary: bool) -> Result<()> {
        let payload = if binary {
            encode_binary_row(row)
        } else {
            encode_text_row(row)
        };
        self.send(payload).await
    }

    async fn local_infile(&mut self, path: &str, status: StatusFlags) -> Result<()> {
        let mut buf = BytesMut::with_capacity(path.len() + 1);
        buf.put_u8(LOCAL_INFILE_HEADER);
        buf.put_slice(path.as_bytes());
        self.send(buf.freeze()).await?;

        let mut data = BytesMut::new();
        loop {
            let chunk = self.read().await?;
            if chunk.is_empty() {
                break;
            }
            data.put_slice(&chunk);
        }
        let lines = data.iter().filter(|&&b| b == b'\n').count() as u64;
        self.shared.recorder.lock().await.local_infile.push(data.freeze());
        self.send_ok(lines, 0, status).await
    }

    async fn send_ok(&mut self, affected_rows: u64, last_insert_id: u64, status: StatusFlags) -> Result<()> {
        let mut buf = BytesMut::new();
        OkPacket {
            affected_rows,
            last_insert_id,
            status,
            ..OkPacket::default()
        }
        .encode(&mut buf, self.capabilities);
        self.send(buf.freeze()).await
    }

    async fn send_eof(&mut self, status: StatusFlags) -> Result<()> {
        let mut buf = BytesMut::new();
        EofPacket {
            warnings: 0,
            status,
        }
        .encode(&mut buf);
        self.send(buf.freeze()).await
    }

    /// The packet that ends a row stream.
    async fn send_terminator(&mut self, status: StatusFlags) -> Result<()> {
        if self.deprecate_eof() {
            let mut buf = BytesMut::new();
            OkPacket {
                status,
                ..OkPacket::default()
            }
            .encode_with_header(&mut buf, self.capabilities, EOF_HEADER);
            self.send(buf.freeze()).await
        } else {
            self.send_eof(status).await
        }
    }

    async fn send_err(&mut self, code: u16, state: &str, message: &str) -> Result<()> {
        let mut buf = BytesMut::new();
        ErrPacket::new(code, state, message).encode(&mut buf);
        self.send(buf.freeze()).await
    }

    async fn unknown_statement(&mut self, id: u32) -> Result<()> {
        let message = format!("Unknown prepared statement handler ({id}) given to mysqld_stmt_execute");
        self.send_err(1243, "HY000", &message).await
    }
}
