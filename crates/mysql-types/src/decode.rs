//! Decoding of text-protocol and binary-protocol values.
//!
//! Text rows (`COM_QUERY`) carry every value as a length-encoded string,
//! with `0xFB` standing for NULL. Binary rows (`COM_STMT_EXECUTE`) start
//! with a `0x00` header and a NULL bitmap offset by two bits, followed by
//! the non-NULL values in their fixed or length-encoded binary form.

use bytes::{Buf, Bytes};
use mysql_protocol::codec::{
    read_fixed, read_i8, read_i16, read_i32, read_i64, read_lenenc_bytes,
    read_lenenc_bytes_or_null, read_u8, read_u16, read_u32, read_u64,
};
use mysql_protocol::statement::{BINARY_ROW_NULL_OFFSET, is_null_in_bitmap, null_bitmap_len};
use mysql_protocol::{ColumnDefinition, ColumnType, ProtocolError, charset};

use crate::error::TypeError;
use crate::temporal::{Date, DateTime, Time};
use crate::value::SqlValue;

/// Decode one text-protocol value. `None` is the NULL marker.
pub fn decode_text_value(
    raw: Option<Bytes>,
    column: &ColumnDefinition,
) -> Result<SqlValue, TypeError> {
    let Some(raw) = raw else {
        return Ok(SqlValue::Null);
    };
    let ty = column.column_type;
    let unsigned = column.is_unsigned();

    match ty {
        ColumnType::Null => Ok(SqlValue::Null),
        ColumnType::Tiny
        | ColumnType::Short
        | ColumnType::Long
        | ColumnType::Int24
        | ColumnType::LongLong
        | ColumnType::Year => {
            let text = ascii_text(&raw, ty)?;
            if unsigned {
                text.parse::<u64>()
                    .map(SqlValue::UInt)
                    .map_err(|_| invalid_text(ty, text))
            } else {
                text.parse::<i64>()
                    .map(SqlValue::Int)
                    .map_err(|_| invalid_text(ty, text))
            }
        }
        ColumnType::Float => {
            let text = ascii_text(&raw, ty)?;
            text.parse::<f32>()
                .map(SqlValue::Float)
                .map_err(|_| invalid_text(ty, text))
        }
        ColumnType::Double => {
            let text = ascii_text(&raw, ty)?;
            text.parse::<f64>()
                .map(SqlValue::Double)
                .map_err(|_| invalid_text(ty, text))
        }
        ColumnType::Decimal | ColumnType::NewDecimal => {
            let text = ascii_text(&raw, ty)?;
            Ok(SqlValue::Decimal(text.to_owned()))
        }
        ColumnType::Date => Date::parse(ascii_text(&raw, ty)?).map(SqlValue::Date),
        ColumnType::DateTime | ColumnType::Timestamp => {
            DateTime::parse(ascii_text(&raw, ty)?).map(SqlValue::DateTime)
        }
        ColumnType::Time => Time::parse(ascii_text(&raw, ty)?).map(SqlValue::Time),
        _ => decode_bytes_value(raw, ty, column.charset),
    }
}

/// Decode one binary-protocol value of the given type.
///
/// `charset` decides whether string types decode to text or stay binary.
pub fn decode_binary_value(
    src: &mut impl Buf,
    ty: ColumnType,
    unsigned: bool,
    charset: u16,
) -> Result<SqlValue, TypeError> {
    let value = match ty {
        ColumnType::Null => SqlValue::Null,
        ColumnType::Tiny => {
            if unsigned {
                SqlValue::UInt(u64::from(read_u8(src)?))
            } else {
                SqlValue::Int(i64::from(read_i8(src)?))
            }
        }
        ColumnType::Short | ColumnType::Year => {
            if unsigned {
                SqlValue::UInt(u64::from(read_u16(src)?))
            } else {
                SqlValue::Int(i64::from(read_i16(src)?))
            }
        }
        // MEDIUMINT travels as a full 4-byte integer.
        ColumnType::Long | ColumnType::Int24 => {
            if unsigned {
                SqlValue::UInt(u64::from(read_u32(src)?))
            } else {
                SqlValue::Int(i64::from(read_i32(src)?))
            }
        }
        ColumnType::LongLong => {
            if unsigned {
                SqlValue::UInt(read_u64(src)?)
            } else {
                SqlValue::Int(read_i64(src)?)
            }
        }
        ColumnType::Float => SqlValue::Float(f32::from_bits(read_u32(src)?)),
        ColumnType::Double => SqlValue::Double(f64::from_bits(read_u64(src)?)),
        ColumnType::Date => SqlValue::Date(decode_binary_datetime(src)?.date()),
        ColumnType::DateTime | ColumnType::Timestamp => {
            SqlValue::DateTime(decode_binary_datetime(src)?)
        }
        ColumnType::Time => SqlValue::Time(decode_binary_time(src)?),
        ColumnType::Decimal | ColumnType::NewDecimal => {
            let raw = read_lenenc_bytes(src)?;
            SqlValue::Decimal(ascii_text(&raw, ty)?.to_owned())
        }
        _ => decode_bytes_value(read_lenenc_bytes(src)?, ty, charset)?,
    };
    Ok(value)
}

/// Decode a text-protocol row.
pub fn decode_text_row(
    mut payload: Bytes,
    columns: &[ColumnDefinition],
) -> Result<Vec<SqlValue>, TypeError> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let raw = read_lenenc_bytes_or_null(&mut payload)?;
        values.push(decode_text_value(raw, column)?);
    }
    Ok(values)
}

/// Decode a binary-protocol row, including its `0x00` header.
pub fn decode_binary_row(
    mut payload: Bytes,
    columns: &[ColumnDefinition],
) -> Result<Vec<SqlValue>, TypeError> {
    let header = read_u8(&mut payload)?;
    if header != 0x00 {
        return Err(ProtocolError::UnexpectedPacket {
            header,
            context: "binary row",
        }
        .into());
    }
    let bitmap = read_fixed(
        &mut payload,
        null_bitmap_len(columns.len(), BINARY_ROW_NULL_OFFSET),
    )?;

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        if is_null_in_bitmap(&bitmap, i, BINARY_ROW_NULL_OFFSET) {
            values.push(SqlValue::Null);
            continue;
        }
        values.push(decode_binary_value(
            &mut payload,
            column.column_type,
            column.is_unsigned(),
            column.charset,
        )?);
    }
    Ok(values)
}

/// Binary DATE/DATETIME/TIMESTAMP: a length byte of 0, 4, 7 or 11.
fn decode_binary_datetime(src: &mut impl Buf) -> Result<DateTime, TypeError> {
    let len = read_u8(src)?;
    let mut dt = DateTime::default();
    if len == 0 {
        return Ok(dt);
    }
    if !matches!(len, 4 | 7 | 11) {
        return Err(TypeError::InvalidDateTime(format!(
            "binary datetime length {len}"
        )));
    }
    dt.year = read_u16(src)?;
    dt.month = read_u8(src)?;
    dt.day = read_u8(src)?;
    if len >= 7 {
        dt.hour = read_u8(src)?;
        dt.minute = read_u8(src)?;
        dt.second = read_u8(src)?;
    }
    if len == 11 {
        dt.microsecond = read_u32(src)?;
    }
    Ok(dt)
}

/// Binary TIME: a length byte of 0, 8 or 12, with days folded into hours.
fn decode_binary_time(src: &mut impl Buf) -> Result<Time, TypeError> {
    let len = read_u8(src)?;
    let mut time = Time::default();
    if len == 0 {
        return Ok(time);
    }
    if !matches!(len, 8 | 12) {
        return Err(TypeError::InvalidDateTime(format!("binary time length {len}")));
    }
    time.negative = read_u8(src)? == 1;
    let days = read_u32(src)?;
    let hours = u32::from(read_u8(src)?);
    time.hours = days
        .checked_mul(24)
        .and_then(|h| h.checked_add(hours))
        .ok_or(TypeError::OutOfRange { target_type: "TIME" })?;
    time.minutes = read_u8(src)?;
    time.seconds = read_u8(src)?;
    if len == 12 {
        time.microseconds = read_u32(src)?;
    }
    Ok(time)
}

/// String-like and opaque types: text unless the charset is `binary`.
fn decode_bytes_value(raw: Bytes, ty: ColumnType, charset: u16) -> Result<SqlValue, TypeError> {
    match ty {
        // JSON columns report the binary charset but always hold utf8mb4.
        ColumnType::Json => decode_string(raw, u16::from(charset::UTF8MB4_GENERAL_CI))
            .map(SqlValue::String),
        ColumnType::Bit | ColumnType::Geometry => Ok(SqlValue::Binary(raw)),
        _ if charset == u16::from(charset::BINARY) => Ok(SqlValue::Binary(raw)),
        _ => decode_string(raw, charset).map(SqlValue::String),
    }
}

/// Decode column text in the given collation.
///
/// UTF-8 is tried first. Other server charsets are decoded with
/// `encoding_rs` when the `encoding` feature is enabled, and lossily
/// otherwise.
pub fn decode_string(raw: Bytes, charset: u16) -> Result<String, TypeError> {
    match String::from_utf8(raw.to_vec()) {
        Ok(s) => Ok(s),
        Err(err) => {
            #[cfg(feature = "encoding")]
            if let Some(encoding) = encoding_for_collation(charset) {
                let (decoded, _, had_errors) = encoding.decode(&raw);
                if !had_errors {
                    return Ok(decoded.into_owned());
                }
            }

            if is_utf8_collation(charset) {
                return Err(TypeError::InvalidEncoding(err.to_string()));
            }
            Ok(String::from_utf8_lossy(&raw).into_owned())
        }
    }
}

fn is_utf8_collation(id: u16) -> bool {
    matches!(id, 33 | 45 | 46 | 76 | 83 | 192..=247 | 255..=323)
}

/// Encoding for a non-UTF-8 collation id.
#[cfg(feature = "encoding")]
fn encoding_for_collation(id: u16) -> Option<&'static encoding_rs::Encoding> {
    match id {
        // latin1_*
        5 | 8 | 15 | 31 | 47 | 48 | 49 | 94 => Some(encoding_rs::WINDOWS_1252),
        // latin2_*, cp1250_*
        2 | 9 | 21 | 27 | 77 | 26 | 34 | 44 | 66 | 99 => Some(encoding_rs::WINDOWS_1250),
        // cp1251_*
        14 | 23 | 50 | 51 | 52 => Some(encoding_rs::WINDOWS_1251),
        // koi8r, koi8u
        7 | 74 => Some(encoding_rs::KOI8_R),
        22 | 75 => Some(encoding_rs::KOI8_U),
        // greek, hebrew, latin5 (Turkish)
        25 | 70 => Some(encoding_rs::ISO_8859_7),
        16 | 71 => Some(encoding_rs::ISO_8859_8),
        30 | 78 => Some(encoding_rs::WINDOWS_1254),
        // cp1256, cp1257
        57 | 67 => Some(encoding_rs::WINDOWS_1256),
        29 | 58 | 59 => Some(encoding_rs::WINDOWS_1257),
        // CJK
        13 | 88 | 95 | 96 => Some(encoding_rs::SHIFT_JIS),
        12 | 91 | 97 | 98 => Some(encoding_rs::EUC_JP),
        19 | 85 => Some(encoding_rs::EUC_KR),
        1 | 84 => Some(encoding_rs::BIG5),
        24 | 28 | 86 | 87 => Some(encoding_rs::GBK),
        248..=250 => Some(encoding_rs::GB18030),
        _ => None,
    }
}

fn ascii_text(raw: &[u8], ty: ColumnType) -> Result<&str, TypeError> {
    std::str::from_utf8(raw).map_err(|_| TypeError::InvalidText {
        column_type: type_label(ty),
        value: String::from_utf8_lossy(raw).into_owned(),
    })
}

fn invalid_text(ty: ColumnType, text: &str) -> TypeError {
    TypeError::InvalidText {
        column_type: type_label(ty),
        value: text.to_owned(),
    }
}

fn type_label(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Tiny => "TINYINT",
        ColumnType::Short => "SMALLINT",
        ColumnType::Long => "INT",
        ColumnType::Int24 => "MEDIUMINT",
        ColumnType::LongLong => "BIGINT",
        ColumnType::Year => "YEAR",
        ColumnType::Float => "FLOAT",
        ColumnType::Double => "DOUBLE",
        ColumnType::Decimal | ColumnType::NewDecimal => "DECIMAL",
        ColumnType::Date => "DATE",
        ColumnType::Time => "TIME",
        ColumnType::DateTime => "DATETIME",
        ColumnType::Timestamp => "TIMESTAMP",
        _ => "string",
    }
}
