//! Trait for converting from SQL values to Rust types.

use bytes::Bytes;

use crate::error::TypeError;
use crate::temporal::{Date, DateTime, Time};
use crate::value::SqlValue;

/// Trait for types that can be converted from SQL values.
///
/// This trait is implemented for common Rust types to enable
/// type-safe extraction of values from query results.
pub trait FromSql: Sized {
    /// Convert from a SQL value to this type.
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError>;

    /// Convert from an optional SQL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_sql(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &SqlValue) -> TypeError {
    match value {
        SqlValue::Null => TypeError::UnexpectedNull,
        _ => TypeError::TypeMismatch {
            expected,
            actual: value.type_name().to_string(),
        },
    }
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Int(v) => Ok(*v != 0),
            SqlValue::UInt(v) => Ok(*v != 0),
            // BIT(1) columns arrive as a single byte.
            SqlValue::Binary(b) if b.len() == 1 => Ok(b[0] != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

macro_rules! impl_from_sql_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromSql for $ty {
                fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
                    let out_of_range = || TypeError::OutOfRange { target_type: $name };
                    match value {
                        SqlValue::Int(v) => <$ty>::try_from(*v).map_err(|_| out_of_range()),
                        SqlValue::UInt(v) => <$ty>::try_from(*v).map_err(|_| out_of_range()),
                        _ => Err(mismatch($name, value)),
                    }
                }
            }
        )*
    };
}

impl_from_sql_int! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
}

impl FromSql for f32 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Float(v) => Ok(*v),
            _ => Err(mismatch("f32", value)),
        }
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Double(v) => Ok(*v),
            SqlValue::Float(v) => Ok(f64::from(*v)),
            SqlValue::Int(v) => Ok(*v as f64),
            SqlValue::UInt(v) => Ok(*v as f64),
            SqlValue::Decimal(s) => s.parse().map_err(|_| TypeError::InvalidDecimal(s.clone())),
            _ => Err(mismatch("f64", value)),
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(v) | SqlValue::Decimal(v) => Ok(v.clone()),
            SqlValue::Binary(b) => String::from_utf8(b.to_vec())
                .map_err(|e| TypeError::InvalidEncoding(e.to_string())),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::UInt(v) => Ok(v.to_string()),
            SqlValue::Date(v) => Ok(v.to_string()),
            SqlValue::Time(v) => Ok(v.to_string()),
            SqlValue::DateTime(v) => Ok(v.to_string()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromSql for Vec<u8> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v.to_vec()),
            SqlValue::String(v) => Ok(v.as_bytes().to_vec()),
            _ => Err(mismatch("Vec<u8>", value)),
        }
    }
}

impl FromSql for Bytes {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v.clone()),
            SqlValue::String(v) => Ok(Bytes::copy_from_slice(v.as_bytes())),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl FromSql for Date {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Date(v) => Ok(*v),
            SqlValue::DateTime(v) => Ok(v.date()),
            _ => Err(mismatch("Date", value)),
        }
    }
}

impl FromSql for Time {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Time(v) => Ok(*v),
            _ => Err(mismatch("Time", value)),
        }
    }
}

impl FromSql for DateTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTime(v) => Ok(*v),
            SqlValue::Date(v) => Ok(DateTime::new(*v, 0, 0, 0, 0)),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl FromSql for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        T::from_sql_nullable(value)
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::NaiveDate {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Date::from_sql(value).and_then(chrono::NaiveDate::try_from)
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::NaiveTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Time::from_sql(value).and_then(chrono::NaiveTime::try_from)
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::NaiveDateTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        DateTime::from_sql(value).and_then(chrono::NaiveDateTime::try_from)
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::DateTime<chrono::Utc> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        chrono::NaiveDateTime::from_sql(value).map(|dt| dt.and_utc())
    }
}

#[cfg(feature = "uuid")]
impl FromSql for uuid::Uuid {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            // BINARY(16) storage
            SqlValue::Binary(b) if b.len() == 16 => {
                uuid::Uuid::from_slice(b).map_err(|e| TypeError::InvalidUuid(e.to_string()))
            }
            SqlValue::String(s) => {
                uuid::Uuid::parse_str(s).map_err(|e| TypeError::InvalidUuid(e.to_string()))
            }
            _ => Err(mismatch("Uuid", value)),
        }
    }
}

#[cfg(feature = "decimal")]
impl FromSql for rust_decimal::Decimal {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        use std::str::FromStr;

        match value {
            SqlValue::Decimal(s) | SqlValue::String(s) => rust_decimal::Decimal::from_str(s)
                .map_err(|e| TypeError::InvalidDecimal(e.to_string())),
            SqlValue::Int(v) => Ok(rust_decimal::Decimal::from(*v)),
            SqlValue::UInt(v) => Ok(rust_decimal::Decimal::from(*v)),
            _ => Err(mismatch("Decimal", value)),
        }
    }
}

#[cfg(feature = "json")]
impl FromSql for serde_json::Value {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(s) => {
                serde_json::from_str(s).map_err(|e| TypeError::InvalidJson(e.to_string()))
            }
            SqlValue::Binary(b) => {
                serde_json::from_slice(b).map_err(|e| TypeError::InvalidJson(e.to_string()))
            }
            _ => Err(mismatch("JSON", value)),
        }
    }
}
