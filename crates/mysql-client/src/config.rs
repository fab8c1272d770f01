//! Client configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mysql_auth::{Credentials, RsaKeyCache};
use mysql_protocol::{DEFAULT_MAX_PACKET_SIZE, charset};
#[cfg(feature = "tls")]
use mysql_tls::TlsConfig;

use crate::error::{Error, Result};
use crate::statement_cache::DEFAULT_MAX_STATEMENTS;

/// Default MySQL TCP port.
pub const DEFAULT_PORT: u16 = 3306;

/// Timeout configuration for the connection phases.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TimeoutConfig {
    /// Time to establish the TCP or Unix socket connection (default: 10s).
    pub connect_timeout: Duration,
    /// Time to complete the handshake, TLS upgrade and authentication
    /// (default: 30s).
    pub login_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            login_timeout: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the socket connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the login sequence timeout.
    #[must_use]
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Get the total time allowed for a full connection.
    #[must_use]
    pub fn total_connect_timeout(&self) -> Duration {
        self.connect_timeout + self.login_timeout
    }
}

/// Configuration for connecting to a MySQL server.
///
/// This struct is marked `#[non_exhaustive]`; build it with
/// [`Config::new()`] and the setter methods.
///
/// ```rust,ignore
/// use mysql_client::Config;
///
/// let config = Config::new()
///     .host("db.internal")
///     .user("app")
///     .password("secret")
///     .database("orders")
///     .compression(true);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 3306).
    pub port: u16,

    /// Unix socket path. Takes precedence over `host` and `port`.
    pub socket: Option<PathBuf>,

    /// Authentication credentials.
    pub credentials: Credentials,

    /// Default database.
    pub database: Option<String>,

    /// Connection collation id (default: `utf8mb4_general_ci`).
    pub charset: u8,

    /// TLS configuration. `None` disables TLS.
    #[cfg(feature = "tls")]
    pub tls: Option<TlsConfig>,

    /// Whether to request the compressed protocol.
    pub compression: bool,

    /// Whether `LOAD DATA LOCAL INFILE` requests are honored.
    pub local_infile: bool,

    /// `sql_mode` applied to the session after connecting.
    pub sql_mode: Option<String>,

    /// Server RSA public key in PEM, for password exchange without TLS.
    pub server_public_key: Option<String>,

    /// Parsed RSA public keys, shared by every connection made from clones
    /// of this config.
    pub rsa_key_cache: Option<Arc<RsaKeyCache>>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Maximum packet size announced to the server.
    pub max_packet_size: u32,

    /// Connection attributes sent in addition to `_client_name` and
    /// `_client_version`.
    pub attributes: Vec<(String, String)>,

    /// Capacity of the per-connection prepared statement cache.
    /// Zero disables caching.
    pub statement_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            socket: None,
            credentials: Credentials::new("root", ""),
            database: None,
            charset: charset::UTF8MB4_GENERAL_CI,
            #[cfg(feature = "tls")]
            tls: None,
            compression: false,
            local_infile: false,
            sql_mode: None,
            server_public_key: None,
            rsa_key_cache: Some(Arc::default()),
            timeouts: TimeoutConfig::default(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            attributes: Vec::new(),
            statement_cache_size: DEFAULT_MAX_STATEMENTS,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect through a Unix socket instead of TCP.
    #[must_use]
    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket = Some(path.into());
        self
    }

    /// Set the username, keeping the password.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        let password = self.credentials.password().to_owned();
        self.credentials = Credentials::new(user.into(), password);
        self
    }

    /// Set the password, keeping the username.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        let user = self.credentials.username().to_owned();
        self.credentials = Credentials::new(user, password.into());
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the connection collation id.
    #[must_use]
    pub fn charset(mut self, collation: u8) -> Self {
        self.charset = collation;
        self
    }

    /// Set the connection character set by name, e.g. `utf8mb4` or `latin1`.
    pub fn charset_name(self, name: &str) -> Result<Self> {
        let id = charset::from_name(name)
            .ok_or_else(|| Error::Config(format!("unknown character set: {name}")))?;
        Ok(self.charset(id))
    }

    /// Set the TLS configuration.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Disable TLS.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn no_tls(mut self) -> Self {
        self.tls = None;
        self
    }

    /// Request the compressed protocol.
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Honor `LOAD DATA LOCAL INFILE` requests from the server.
    #[must_use]
    pub fn local_infile(mut self, enabled: bool) -> Self {
        self.local_infile = enabled;
        self
    }

    /// Set the session `sql_mode` applied after connecting.
    #[must_use]
    pub fn sql_mode(mut self, mode: impl Into<String>) -> Self {
        self.sql_mode = Some(mode.into());
        self
    }

    /// Set the server RSA public key (PEM).
    #[must_use]
    pub fn server_public_key(mut self, pem: impl Into<String>) -> Self {
        self.server_public_key = Some(pem.into());
        self
    }

    /// Share a cache of parsed server public keys with other configs.
    #[must_use]
    pub fn rsa_key_cache(mut self, cache: Arc<RsaKeyCache>) -> Self {
        self.rsa_key_cache = Some(cache);
        self
    }

    /// Set the socket connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the maximum packet size.
    #[must_use]
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Add a connection attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Set the prepared statement cache capacity.
    #[must_use]
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.socket.is_none() && self.host.is_empty() {
            return Err(Error::Config("host is empty".into()));
        }
        if self.credentials.username().is_empty() {
            return Err(Error::Config("user is empty".into()));
        }
        if self.max_packet_size == 0 {
            return Err(Error::Config("max_packet_size must be positive".into()));
        }
        if let Some(db) = &self.database {
            if db.is_empty() || db.contains('\0') {
                return Err(Error::Config(format!("invalid database name: {db:?}")));
            }
        }
        Ok(())
    }

    /// `host:port` or the socket path, for logging.
    #[must_use]
    pub fn address(&self) -> String {
        match &self.socket {
            Some(path) => path.display().to_string(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Connection attributes as sent in the handshake response.
    pub(crate) fn connect_attributes(&self) -> Vec<(String, String)> {
        let mut attrs = vec![
            ("_client_name".to_string(), env!("CARGO_PKG_NAME").to_string()),
            (
                "_client_version".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ];
        attrs.extend(self.attributes.iter().cloned());
        attrs
    }
}
