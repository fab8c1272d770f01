//! Client error types.

use std::sync::Arc;

use thiserror::Error;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection is unusable. Every pending operation failed with it.
    Connection,
    /// The server rejected one command. The connection stays usable.
    Query,
    /// The caller misused the API. No I/O happened.
    Usage,
    /// A row from the server could not be decoded. The connection is
    /// closed.
    Decode,
}

/// Errors that can occur during client operations.
///
/// `Error` is `Clone` so that a single fatal error can be handed to every
/// operation waiting on the connection.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection timeout occurred.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// IO error.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] mysql_protocol::ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] mysql_codec::CodecError),

    /// Authentication failed on the client side.
    #[error("authentication failed: {0}")]
    Authentication(#[from] mysql_auth::AuthError),

    /// TLS error.
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] mysql_tls::TlsError),

    /// The server refused the connection or the credentials.
    #[error("handshake failed: [{code}] ({state}) {message}")]
    Handshake {
        /// MySQL error code.
        code: u16,
        /// SQLSTATE.
        state: String,
        /// Error message.
        message: String,
    },

    /// Server returned an error for a command.
    #[error("server error [{code}] ({state}): {message}")]
    Server {
        /// MySQL error code.
        code: u16,
        /// SQLSTATE.
        state: String,
        /// Error message.
        message: String,
        /// SQL text of the failed command, when there was one.
        sql: Option<String>,
    },

    /// A placeholder has no value.
    #[error("missing value for parameter {0}")]
    MissingParameter(String),

    /// A named value matches no placeholder.
    #[error("unknown parameter :{0}")]
    UnknownParameter(String),

    /// More positional values than `?` placeholders.
    #[error("too many parameters: statement takes {expected}, got {actual}")]
    TooManyParameters {
        /// Positional placeholders in the statement.
        expected: usize,
        /// Positional values supplied.
        actual: usize,
    },

    /// The prepared statement was closed.
    #[error("statement is closed")]
    StatementClosed,

    /// `next_result` was called before the current rows were drained.
    #[error("current result set has unread rows")]
    ResultNotConsumed,

    /// The transaction was already committed or rolled back.
    #[error("transaction already finished")]
    TransactionFinished,

    /// A transaction holds the connection; run commands through it.
    #[error("a transaction is open on this connection")]
    TransactionActive,

    /// Invalid identifier (potential SQL injection attempt).
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server asked for a local file but local infile is disabled.
    #[error("server requested local file {0:?} but local infile is disabled")]
    LocalInfileDisabled(String),

    /// Conversion of a value on the caller's side failed, e.g. a
    /// `Row::get` with an unknown column or an incompatible target type.
    #[error("type error: {0}")]
    Type(#[from] mysql_types::TypeError),

    /// The server sent a row that does not decode against its column
    /// definitions.
    #[error("row decode error: {0}")]
    Decode(mysql_types::TypeError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl Error {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Server { .. } => ErrorKind::Query,
            Self::MissingParameter(_)
            | Self::UnknownParameter(_)
            | Self::TooManyParameters { .. }
            | Self::StatementClosed
            | Self::ResultNotConsumed
            | Self::TransactionFinished
            | Self::TransactionActive
            | Self::InvalidIdentifier(_)
            | Self::Config(_)
            | Self::LocalInfileDisabled(_)
            | Self::Type(_) => ErrorKind::Usage,
            Self::Decode(_) => ErrorKind::Decode,
            _ => ErrorKind::Connection,
        }
    }

    /// Check if the error closed the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Decode)
            || matches!(self, Self::LocalInfileDisabled(_))
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include timeouts, connection loss, deadlocks and
    /// lock wait timeouts.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionTimeout | Self::ConnectionClosed | Self::Io(_) => true,
            // ER_LOCK_DEADLOCK, ER_LOCK_WAIT_TIMEOUT
            Self::Server { code, .. } => matches!(code, 1205 | 1213),
            _ => false,
        }
    }

    /// Check if this error indicates a protocol/driver bug.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Codec(_))
    }

    /// Check if this is a server error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, code: u16) -> bool {
        matches!(self, Self::Server { code: c, .. } if *c == code)
    }

    /// MySQL error code of a server or handshake error.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Server { code, .. } | Self::Handshake { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// SQLSTATE of a server or handshake error.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Server { state, .. } | Self::Handshake { state, .. } => Some(state),
            _ => None,
        }
    }

    pub(crate) fn server(err: mysql_protocol::ErrPacket, sql: Option<&str>) -> Self {
        Self::Server {
            code: err.code,
            state: err.sql_state,
            message: err.message,
            sql: sql.map(str::to_owned),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let server = Error::server(
            mysql_protocol::ErrPacket::new(1146, "42S02", "Table 't' doesn't exist"),
            Some("SELECT * FROM t"),
        );
        assert_eq!(server.kind(), ErrorKind::Query);
        assert!(!server.is_fatal());
        assert_eq!(server.code(), Some(1146));
        assert_eq!(server.sql_state(), Some("42S02"));

        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Connection);
        assert!(Error::ConnectionClosed.is_fatal());
        assert_eq!(Error::ResultNotConsumed.kind(), ErrorKind::Usage);
        assert!(!Error::ResultNotConsumed.is_fatal());
        assert_eq!(Error::TransactionActive.kind(), ErrorKind::Usage);
        let decode = Error::Decode(mysql_types::TypeError::UnexpectedNull);
        assert_eq!(decode.kind(), ErrorKind::Decode);
        assert!(decode.is_fatal());
    }

    #[test]
    fn test_conversion_errors_are_not_fatal() {
        let err: Error = mysql_types::TypeError::UnexpectedNull.into();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient() {
        let deadlock = Error::server(
            mysql_protocol::ErrPacket::new(1213, "40001", "Deadlock found"),
            None,
        );
        assert!(deadlock.is_transient());
        assert!(Error::ConnectionTimeout.is_transient());
        assert!(!Error::StatementClosed.is_transient());
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
