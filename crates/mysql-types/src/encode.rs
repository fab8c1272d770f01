//! Binary-protocol encoding of SQL values.
//!
//! Parameters of `COM_STMT_EXECUTE` are sent with an explicit type, so each
//! value is encoded in the widest natural form for its variant. The row
//! encoders are the mirror of [`crate::decode`] and are what test servers
//! use to produce result sets.

use bytes::{BufMut, Bytes, BytesMut};
use mysql_protocol::codec::{write_lenenc_bytes, write_lenenc_str};
use mysql_protocol::statement::{BINARY_ROW_NULL_OFFSET, null_bitmap_len};
use mysql_protocol::{ColumnType, ExecuteParam, ParamValue};

use crate::temporal::{DateTime, Time};
use crate::value::SqlValue;

/// Column type and unsigned flag a value is sent as.
#[must_use]
pub fn column_type_of(value: &SqlValue) -> (ColumnType, bool) {
    match value {
        SqlValue::Null => (ColumnType::Null, false),
        SqlValue::Int(_) => (ColumnType::LongLong, false),
        SqlValue::UInt(_) => (ColumnType::LongLong, true),
        SqlValue::Float(_) => (ColumnType::Float, false),
        SqlValue::Double(_) => (ColumnType::Double, false),
        SqlValue::String(_) => (ColumnType::VarString, false),
        SqlValue::Binary(_) => (ColumnType::Blob, false),
        SqlValue::Decimal(_) => (ColumnType::NewDecimal, false),
        SqlValue::Date(_) => (ColumnType::Date, false),
        SqlValue::Time(_) => (ColumnType::Time, false),
        SqlValue::DateTime(_) => (ColumnType::DateTime, false),
    }
}

/// Build the execute parameter for a value.
#[must_use]
pub fn encode_param(value: &SqlValue) -> ExecuteParam {
    if value.is_null() {
        return ExecuteParam::null();
    }
    let (column_type, unsigned) = column_type_of(value);
    let mut buf = BytesMut::new();
    encode_binary_value(&mut buf, value);
    ExecuteParam {
        column_type,
        unsigned,
        value: ParamValue::Bytes(buf.freeze()),
    }
}

/// Write the binary-protocol form of a value. NULL writes nothing.
pub fn encode_binary_value(dst: &mut impl BufMut, value: &SqlValue) {
    match value {
        SqlValue::Null => {}
        SqlValue::Int(v) => dst.put_i64_le(*v),
        SqlValue::UInt(v) => dst.put_u64_le(*v),
        SqlValue::Float(v) => dst.put_f32_le(*v),
        SqlValue::Double(v) => dst.put_f64_le(*v),
        SqlValue::String(v) | SqlValue::Decimal(v) => write_lenenc_str(dst, v),
        SqlValue::Binary(v) => write_lenenc_bytes(dst, v),
        SqlValue::Date(d) => encode_datetime(dst, &DateTime::new(*d, 0, 0, 0, 0)),
        SqlValue::DateTime(dt) => encode_datetime(dst, dt),
        SqlValue::Time(t) => encode_time(dst, t),
    }
}

/// DATE/DATETIME in the shortest of the 0, 4, 7 and 11 byte forms.
fn encode_datetime(dst: &mut impl BufMut, dt: &DateTime) {
    let len: u8 = if dt.microsecond != 0 {
        11
    } else if dt.hour != 0 || dt.minute != 0 || dt.second != 0 {
        7
    } else if !dt.date().is_zero() {
        4
    } else {
        0
    };
    dst.put_u8(len);
    if len == 0 {
        return;
    }
    dst.put_u16_le(dt.year);
    dst.put_u8(dt.month);
    dst.put_u8(dt.day);
    if len >= 7 {
        dst.put_u8(dt.hour);
        dst.put_u8(dt.minute);
        dst.put_u8(dt.second);
    }
    if len == 11 {
        dst.put_u32_le(dt.microsecond);
    }
}

/// TIME in the 0, 8 or 12 byte form, splitting hours into days.
fn encode_time(dst: &mut impl BufMut, t: &Time) {
    if t.is_zero() {
        dst.put_u8(0);
        return;
    }
    let len: u8 = if t.microseconds != 0 { 12 } else { 8 };
    dst.put_u8(len);
    dst.put_u8(u8::from(t.negative));
    dst.put_u32_le(t.hours / 24);
    dst.put_u8((t.hours % 24) as u8);
    dst.put_u8(t.minutes);
    dst.put_u8(t.seconds);
    if len == 12 {
        dst.put_u32_le(t.microseconds);
    }
}

/// Encode a text-protocol row.
#[must_use]
pub fn encode_text_row(values: &[SqlValue]) -> Bytes {
    let mut buf = BytesMut::new();
    for value in values {
        match value.to_text() {
            Some(text) => write_lenenc_bytes(&mut buf, &text),
            None => buf.put_u8(mysql_protocol::codec::NULL_MARKER),
        }
    }
    buf.freeze()
}

/// Encode a binary-protocol row whose columns have the types given by
/// [`column_type_of`].
#[must_use]
pub fn encode_binary_row(values: &[SqlValue]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x00);
    let mut bitmap = vec![0u8; null_bitmap_len(values.len(), BINARY_ROW_NULL_OFFSET)];
    for (i, value) in values.iter().enumerate() {
        if value.is_null() {
            let bit = i + BINARY_ROW_NULL_OFFSET;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    buf.put_slice(&bitmap);
    for value in values {
        encode_binary_value(&mut buf, value);
    }
    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::{decode_binary_row, decode_binary_value};
    use crate::temporal::Date;
    use mysql_protocol::{ColumnDefinition, ColumnFlags};

    #[test]
    fn test_encode_param_types() {
        let p = encode_param(&SqlValue::UInt(5));
        assert_eq!(p.column_type, ColumnType::LongLong);
        assert!(p.unsigned);
        assert_eq!(p.value, ParamValue::Bytes(Bytes::from_static(&[5, 0, 0, 0, 0, 0, 0, 0])));

        let p = encode_param(&SqlValue::String("x".into()));
        assert_eq!(p.column_type, ColumnType::VarString);
        assert_eq!(p.value, ParamValue::Bytes(Bytes::from_static(b"\x01x")));

        assert_eq!(encode_param(&SqlValue::Null), ExecuteParam::null());
    }

    #[test]
    fn test_datetime_shortest_form() {
        let mut buf = BytesMut::new();
        encode_binary_value(&mut buf, &SqlValue::Date(Date::new(2024, 1, 2)));
        assert_eq!(&buf[..], &[4, 0xE8, 0x07, 1, 2]);

        let mut buf = BytesMut::new();
        encode_binary_value(&mut buf, &SqlValue::DateTime(DateTime::default()));
        assert_eq!(&buf[..], &[0]);
    }

    #[test]
    fn test_time_splits_days() {
        let t = Time {
            negative: true,
            hours: 49,
            minutes: 1,
            seconds: 2,
            microseconds: 0,
        };
        let mut buf = BytesMut::new();
        encode_binary_value(&mut buf, &SqlValue::Time(t));
        assert_eq!(&buf[..], &[8, 1, 2, 0, 0, 0, 1, 1, 2]);

        let decoded = decode_binary_value(&mut buf.freeze(), ColumnType::Time, false, 63).unwrap();
        assert_eq!(decoded, SqlValue::Time(t));
    }

    #[test]
    fn test_binary_row_matches_decoder() {
        let values = vec![
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::String("abc".into()),
            SqlValue::UInt(u64::MAX),
        ];
        let columns: Vec<ColumnDefinition> = values
            .iter()
            .map(|v| {
                let (ty, unsigned) = column_type_of(v);
                let col = ColumnDefinition::new("c", ty);
                if unsigned { col.with_flags(ColumnFlags::UNSIGNED) } else { col }
            })
            .collect();
        let row = encode_binary_row(&values);
        assert_eq!(decode_binary_row(row, &columns).unwrap(), values);
    }

    #[test]
    fn test_text_row() {
        let row = encode_text_row(&[SqlValue::Int(1), SqlValue::Null]);
        assert_eq!(&row[..], b"\x011\xfb");
    }
}
