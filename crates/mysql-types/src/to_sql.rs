//! Trait for converting Rust types to SQL values.

use std::convert::identity;

use bytes::Bytes;

use crate::error::TypeError;
use crate::temporal::{Date, DateTime, Time};
use crate::value::SqlValue;

/// Trait for types that can be converted to SQL values.
///
/// This trait is implemented for common Rust types to enable
/// type-safe parameter binding in queries.
pub trait ToSql {
    /// Convert this value to a SQL value.
    fn to_sql(&self) -> Result<SqlValue, TypeError>;

    /// Get the MySQL type name for this value.
    fn sql_type(&self) -> &'static str;
}

macro_rules! impl_to_sql {
    ($($ty:ty => $variant:ident($conv:expr), $name:literal;)*) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> Result<SqlValue, TypeError> {
                    Ok(SqlValue::$variant(($conv)(*self)))
                }

                fn sql_type(&self) -> &'static str {
                    $name
                }
            }
        )*
    };
}

impl_to_sql! {
    bool => Int(i64::from), "TINYINT(1)";
    i8 => Int(i64::from), "TINYINT";
    i16 => Int(i64::from), "SMALLINT";
    i32 => Int(i64::from), "INT";
    i64 => Int(identity), "BIGINT";
    u8 => UInt(u64::from), "TINYINT UNSIGNED";
    u16 => UInt(u64::from), "SMALLINT UNSIGNED";
    u32 => UInt(u64::from), "INT UNSIGNED";
    u64 => UInt(identity), "BIGINT UNSIGNED";
    f32 => Float(identity), "FLOAT";
    f64 => Double(identity), "DOUBLE";
    Date => Date(identity), "DATE";
    Time => Time(identity), "TIME";
    DateTime => DateTime(identity), "DATETIME";
}

impl ToSql for str {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.to_owned()))
    }

    fn sql_type(&self) -> &'static str {
        "VARCHAR"
    }
}

impl ToSql for String {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "VARCHAR"
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> &'static str {
        "BLOB"
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> &'static str {
        "BLOB"
    }
}

impl ToSql for Bytes {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "BLOB"
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(self.clone())
    }

    fn sql_type(&self) -> &'static str {
        self.type_name()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        match self {
            Some(v) => v.to_sql(),
            None => Ok(SqlValue::Null),
        }
    }

    fn sql_type(&self) -> &'static str {
        match self {
            Some(v) => v.sql_type(),
            None => "NULL",
        }
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        (*self).to_sql()
    }

    fn sql_type(&self) -> &'static str {
        (*self).sql_type()
    }
}

#[cfg(feature = "chrono")]
impl ToSql for chrono::NaiveDate {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Date(Date::from(*self)))
    }

    fn sql_type(&self) -> &'static str {
        "DATE"
    }
}

#[cfg(feature = "chrono")]
impl ToSql for chrono::NaiveTime {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Time(Time::from(*self)))
    }

    fn sql_type(&self) -> &'static str {
        "TIME"
    }
}

#[cfg(feature = "chrono")]
impl ToSql for chrono::NaiveDateTime {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::DateTime(DateTime::from(*self)))
    }

    fn sql_type(&self) -> &'static str {
        "DATETIME"
    }
}

#[cfg(feature = "chrono")]
impl ToSql for chrono::DateTime<chrono::Utc> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::DateTime(DateTime::from(self.naive_utc())))
    }

    fn sql_type(&self) -> &'static str {
        "DATETIME"
    }
}

#[cfg(feature = "uuid")]
impl ToSql for uuid::Uuid {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.hyphenated().to_string()))
    }

    fn sql_type(&self) -> &'static str {
        "CHAR(36)"
    }
}

#[cfg(feature = "decimal")]
impl ToSql for rust_decimal::Decimal {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Decimal(self.to_string()))
    }

    fn sql_type(&self) -> &'static str {
        "DECIMAL"
    }
}

#[cfg(feature = "json")]
impl ToSql for serde_json::Value {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        serde_json::to_string(self)
            .map(SqlValue::String)
            .map_err(|e| TypeError::InvalidJson(e.to_string()))
    }

    fn sql_type(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_keep_sign() {
        assert_eq!((-3i8).to_sql().unwrap(), SqlValue::Int(-3));
        assert_eq!(u64::MAX.to_sql().unwrap(), SqlValue::UInt(u64::MAX));
        assert_eq!(7u16.sql_type(), "SMALLINT UNSIGNED");
    }

    #[test]
    fn test_references_and_options() {
        let s = "abc";
        assert_eq!(s.to_sql().unwrap(), SqlValue::String("abc".into()));
        assert_eq!((&42i32).to_sql().unwrap(), SqlValue::Int(42));
        assert_eq!(None::<i32>.to_sql().unwrap(), SqlValue::Null);
        assert_eq!(None::<i32>.sql_type(), "NULL");
    }

    #[test]
    fn test_bool() {
        assert_eq!(true.to_sql().unwrap(), SqlValue::Int(1));
    }
}
