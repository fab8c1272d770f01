//! Codec error types.

use std::sync::Arc;

use mysql_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while framing packets.
///
/// Cloneable so a single failure can be reported to every waiter on a
/// connection.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Malformed packet contents.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO error on the underlying transport.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// A packet arrived with the wrong sequence id.
    #[error("packet out of order: expected sequence {expected}, got {actual}")]
    SequenceMismatch {
        /// Expected sequence id.
        expected: u8,
        /// Received sequence id.
        actual: u8,
    },

    /// Logical packet exceeds the configured maximum.
    #[error("packet too large: {size} bytes (max: {max})")]
    PacketTooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The zlib layer failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The stream ended in the middle of a packet.
    #[error("connection closed with {0} bytes of an unfinished packet")]
    Truncated(usize),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
