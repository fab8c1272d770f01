//! SQL value representation.

use bytes::Bytes;

use crate::temporal::{Date, DateTime, Time};

/// A SQL value decoded from a result row or bound as a parameter.
///
/// Integers keep their signedness: unsigned columns decode to
/// [`SqlValue::UInt`], so `BIGINT UNSIGNED` values above `i64::MAX` are
/// represented exactly. DECIMAL values are kept as their exact text.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Signed integer (TINYINT..BIGINT, YEAR).
    Int(i64),
    /// Unsigned integer (TINYINT UNSIGNED..BIGINT UNSIGNED).
    UInt(u64),
    /// Single-precision float (FLOAT).
    Float(f32),
    /// Double-precision float (DOUBLE).
    Double(f64),
    /// Text value (CHAR, VARCHAR, TEXT, ENUM, SET, JSON).
    String(String),
    /// Binary value (BINARY, VARBINARY, BLOB, BIT, GEOMETRY).
    Binary(Bytes),
    /// Exact decimal value as text (DECIMAL, NUMERIC).
    Decimal(String),
    /// Date value (DATE).
    Date(Date),
    /// Time value (TIME).
    Time(Time),
    /// Date and time value (DATETIME, TIMESTAMP).
    DateTime(DateTime),
}

impl SqlValue {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as an i64, if it is an integer that fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as a u64, if it is a non-negative integer.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Decimal(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary or text.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            Self::String(v) => Some(v.as_bytes()),
            _ => None,
        }
    }

    /// Get the type name as a string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Int(_) => "BIGINT",
            Self::UInt(_) => "BIGINT UNSIGNED",
            Self::Float(_) => "FLOAT",
            Self::Double(_) => "DOUBLE",
            Self::String(_) => "VARCHAR",
            Self::Binary(_) => "BLOB",
            Self::Decimal(_) => "DECIMAL",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::DateTime(_) => "DATETIME",
        }
    }

    /// Text-protocol representation, or `None` for NULL.
    #[must_use]
    pub fn to_text(&self) -> Option<Bytes> {
        Some(match self {
            Self::Null => return None,
            Self::Int(v) => Bytes::from(v.to_string()),
            Self::UInt(v) => Bytes::from(v.to_string()),
            Self::Float(v) => Bytes::from(v.to_string()),
            Self::Double(v) => Bytes::from(v.to_string()),
            Self::String(v) | Self::Decimal(v) => Bytes::from(v.clone()),
            Self::Binary(v) => v.clone(),
            Self::Date(v) => Bytes::from(v.to_string()),
            Self::Time(v) => Bytes::from(v.to_string()),
            Self::DateTime(v) => Bytes::from(v.to_string()),
        })
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl From<Bytes> for SqlValue {
    fn from(v: Bytes) -> Self {
        Self::Binary(v)
    }
}

impl From<Date> for SqlValue {
    fn from(v: Date) -> Self {
        Self::Date(v)
    }
}

impl From<Time> for SqlValue {
    fn from(v: Time) -> Self {
        Self::Time(v)
    }
}

impl From<DateTime> for SqlValue {
    fn from(v: DateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
