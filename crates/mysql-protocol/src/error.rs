//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while decoding or encoding MySQL protocol structures.
///
/// Every variant describes bytes that do not match the wire format. A
/// protocol error on a live connection is fatal for that connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The buffer ended before a complete structure was read.
    #[error("unexpected end of packet")]
    UnexpectedEof,

    /// A packet header or structure was shorter than its declared size.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Expected length.
        expected: usize,
        /// Available length.
        actual: usize,
    },

    /// A length-encoded integer began with a reserved marker byte.
    #[error("invalid length-encoded integer marker 0x{0:02X}")]
    InvalidLengthEncoding(u8),

    /// A null-terminated string had no terminator.
    #[error("missing null terminator")]
    MissingNullTerminator,

    /// Unsupported handshake protocol version.
    #[error("unsupported handshake protocol version {0}")]
    UnsupportedProtocolVersion(u8),

    /// Column type tag not known to this implementation.
    #[error("unknown column type 0x{0:02X}")]
    UnknownColumnType(u8),

    /// Command byte not known to this implementation.
    #[error("unknown command 0x{0:02X}")]
    UnknownCommand(u8),

    /// A packet had an unexpected leading byte for its position.
    #[error("unexpected packet header 0x{header:02X} while reading {context}")]
    UnexpectedPacket {
        /// The leading byte.
        header: u8,
        /// What the decoder was expecting.
        context: &'static str,
    },

    /// A packet arrived with the wrong sequence id.
    #[error("packet out of order: expected sequence {expected}, got {actual}")]
    SequenceMismatch {
        /// Expected sequence id.
        expected: u8,
        /// Received sequence id.
        actual: u8,
    },

    /// String data was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Payload exceeds the negotiated maximum packet size.
    #[error("packet too large: {length} bytes exceeds maximum {max}")]
    PacketTooLarge {
        /// Payload length.
        length: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A field held a value outside its valid range.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Explanation.
        reason: String,
    },
}
