//! # mysql-types
//!
//! MySQL to Rust type mappings and value codecs.
//!
//! This crate provides bidirectional mapping between MySQL column values
//! and Rust types, covering both the text protocol used by `COM_QUERY` and
//! the binary protocol used by prepared statements.
//!
//! ## Features
//!
//! - `chrono` (default): conversions to and from chrono date/time types
//! - `uuid` (default): UUID support (`CHAR(36)` or `BINARY(16)`)
//! - `decimal` (default): exact decimals via rust_decimal
//! - `json`: JSON documents via serde_json
//! - `encoding`: decoding of non-UTF-8 column charsets via encoding_rs
//!
//! ## Type Mappings
//!
//! | MySQL Type | [`SqlValue`] | Rust Type |
//! |------------|--------------|-----------|
//! | `TINYINT(1)` | `Int` | `bool` |
//! | `TINYINT`..`BIGINT` | `Int` | `i8`..`i64` |
//! | `... UNSIGNED` | `UInt` | `u8`..`u64` |
//! | `FLOAT` | `Float` | `f32` |
//! | `DOUBLE` | `Double` | `f64` |
//! | `DECIMAL`/`NUMERIC` | `Decimal` | `rust_decimal::Decimal` |
//! | `CHAR`/`VARCHAR`/`TEXT` | `String` | `String` |
//! | `BINARY`/`VARBINARY`/`BLOB` | `Binary` | `Vec<u8>`, `Bytes` |
//! | `DATE` | `Date` | [`Date`], `chrono::NaiveDate` |
//! | `TIME` | `Time` | [`Time`], `chrono::NaiveTime` |
//! | `DATETIME`/`TIMESTAMP` | `DateTime` | [`DateTime`], `chrono::NaiveDateTime` |
//! | `JSON` | `String` | `serde_json::Value` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod temporal;
pub mod to_sql;
pub mod value;

pub use decode::{decode_binary_row, decode_binary_value, decode_text_row, decode_text_value};
pub use encode::{column_type_of, encode_binary_row, encode_param, encode_text_row};
pub use error::TypeError;
pub use from_sql::FromSql;
pub use temporal::{Date, DateTime, Time};
pub use to_sql::ToSql;
pub use value::SqlValue;
