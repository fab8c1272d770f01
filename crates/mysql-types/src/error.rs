//! Type conversion error types.

use mysql_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur during value decoding and type conversion.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Invalid encoding in string data.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// Text value could not be parsed as its column type.
    #[error("invalid {column_type} text value: {value:?}")]
    InvalidText {
        /// Column type being parsed.
        column_type: &'static str,
        /// Offending text.
        value: String,
    },

    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Invalid decimal value.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    /// Invalid UUID value.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// Invalid JSON document.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Row payload did not match its column definitions.
    #[error("malformed row: {0}")]
    Protocol(#[from] ProtocolError),
}
