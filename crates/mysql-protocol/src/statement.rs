//! Prepared statement packets.
//!
//! COM_STMT_PREPARE answers with [`PrepareOk`] followed by the parameter and
//! column definitions. COM_STMT_EXECUTE carries a null bitmap, the
//! parameter types and the binary-encoded values.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_fixed, read_u8, read_u16, read_u32};
use crate::command::Command;
use crate::error::ProtocolError;
use crate::packet::OK_HEADER;
use crate::types::ColumnType;

/// Flag byte marking a parameter type as unsigned.
pub const UNSIGNED_TYPE_FLAG: u8 = 0x80;

/// Cursor type byte for a plain (non-cursor) execution.
pub const CURSOR_TYPE_NO_CURSOR: u8 = 0x00;

/// Bit offset of the first column in a binary result row's null bitmap.
pub const BINARY_ROW_NULL_OFFSET: usize = 2;

/// Length of a null bitmap covering `count` fields, starting at bit `offset`.
#[must_use]
pub const fn null_bitmap_len(count: usize, offset: usize) -> usize {
    (count + offset).div_ceil(8)
}

/// Whether field `index` is marked NULL in `bitmap`.
#[must_use]
pub fn is_null_in_bitmap(bitmap: &[u8], index: usize, offset: usize) -> bool {
    let bit = index + offset;
    bitmap
        .get(bit / 8)
        .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
}

/// Response to COM_STMT_PREPARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrepareOk {
    /// Server-assigned statement id.
    pub statement_id: u32,
    /// Number of result columns.
    pub num_columns: u16,
    /// Number of parameters.
    pub num_params: u16,
    /// Warning count.
    pub warnings: u16,
}

impl PrepareOk {
    /// Decode a COM_STMT_PREPARE OK payload.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let header = read_u8(src)?;
        if header != OK_HEADER {
            return Err(ProtocolError::UnexpectedPacket {
                header,
                context: "prepare OK",
            });
        }
        let statement_id = read_u32(src)?;
        let num_columns = read_u16(src)?;
        let num_params = read_u16(src)?;
        let warnings = if src.remaining() >= 3 {
            let _filler = read_u8(src)?;
            read_u16(src)?
        } else {
            0
        };
        Ok(Self {
            statement_id,
            num_columns,
            num_params,
            warnings,
        })
    }

    /// Encode the payload. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(OK_HEADER);
        dst.put_u32_le(self.statement_id);
        dst.put_u16_le(self.num_columns);
        dst.put_u16_le(self.num_params);
        dst.put_u8(0);
        dst.put_u16_le(self.warnings);
    }
}

/// Value slot of one execute parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// SQL NULL (set in the null bitmap).
    Null,
    /// Binary-protocol encoded value.
    Bytes(Bytes),
    /// Value already sent with COM_STMT_SEND_LONG_DATA.
    LongData,
}

/// One parameter of a COM_STMT_EXECUTE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteParam {
    /// Declared parameter type.
    pub column_type: ColumnType,
    /// Whether the integer type is unsigned.
    pub unsigned: bool,
    /// The value.
    pub value: ParamValue,
}

impl ExecuteParam {
    /// SQL NULL parameter.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            column_type: ColumnType::Null,
            unsigned: false,
            value: ParamValue::Null,
        }
    }

    /// Parameter whose value was streamed as long data.
    #[must_use]
    pub const fn long_data() -> Self {
        Self {
            column_type: ColumnType::Blob,
            unsigned: false,
            value: ParamValue::LongData,
        }
    }
}

/// Encode a COM_STMT_EXECUTE payload.
///
/// Parameter types are always sent (`new_params_bound = 1`).
#[must_use]
pub fn encode_execute(statement_id: u32, params: &[ExecuteParam]) -> Bytes {
    let values_len: usize = params
        .iter()
        .map(|p| match &p.value {
            ParamValue::Bytes(b) => b.len(),
            _ => 0,
        })
        .sum();
    let bitmap_len = null_bitmap_len(params.len(), 0);
    let mut buf = BytesMut::with_capacity(11 + bitmap_len + params.len() * 2 + values_len);

    buf.put_u8(Command::StmtExecute as u8);
    buf.put_u32_le(statement_id);
    buf.put_u8(CURSOR_TYPE_NO_CURSOR);
    buf.put_u32_le(1); // iteration count

    if params.is_empty() {
        return buf.freeze();
    }

    let mut bitmap = vec![0u8; bitmap_len];
    for (i, param) in params.iter().enumerate() {
        if param.value == ParamValue::Null {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    buf.put_slice(&bitmap);
    buf.put_u8(1);

    for param in params {
        buf.put_u8(param.column_type.as_u8());
        buf.put_u8(if param.unsigned { UNSIGNED_TYPE_FLAG } else { 0 });
    }
    for param in params {
        if let ParamValue::Bytes(bytes) = &param.value {
            buf.put_slice(bytes);
        }
    }
    buf.freeze()
}

/// Decoded header of a COM_STMT_EXECUTE payload. Used by test servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    /// Statement id.
    pub statement_id: u32,
    /// Null bitmap (offset 0).
    pub null_bitmap: Bytes,
    /// Parameter types with their unsigned flag, when sent.
    pub types: Vec<(ColumnType, bool)>,
    /// Binary-encoded values of the non-null parameters, back to back.
    pub values: Bytes,
}

impl ExecuteRequest {
    /// Decode a COM_STMT_EXECUTE payload, including its command byte.
    ///
    /// `param_count` comes from the matching prepare.
    pub fn decode(src: &mut impl Buf, param_count: usize) -> Result<Self, ProtocolError> {
        let command = read_u8(src)?;
        if command != Command::StmtExecute as u8 {
            return Err(ProtocolError::UnexpectedPacket {
                header: command,
                context: "COM_STMT_EXECUTE",
            });
        }
        let statement_id = read_u32(src)?;
        let _cursor = read_u8(src)?;
        let _iterations = read_u32(src)?;
        if param_count == 0 {
            return Ok(Self {
                statement_id,
                null_bitmap: Bytes::new(),
                types: Vec::new(),
                values: Bytes::new(),
            });
        }
        let null_bitmap = read_fixed(src, null_bitmap_len(param_count, 0))?;
        let bound = read_u8(src)?;
        let mut types = Vec::with_capacity(param_count);
        if bound == 1 {
            for _ in 0..param_count {
                let ty = ColumnType::from_u8(read_u8(src)?)?;
                let flags = read_u8(src)?;
                types.push((ty, flags & UNSIGNED_TYPE_FLAG != 0));
            }
        }
        let values = src.copy_to_bytes(src.remaining());
        Ok(Self {
            statement_id,
            null_bitmap,
            types,
            values,
        })
    }

    /// Whether parameter `index` is NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        is_null_in_bitmap(&self.null_bitmap, index, 0)
    }
}

/// Encode a COM_STMT_SEND_LONG_DATA payload.
#[must_use]
pub fn encode_send_long_data(statement_id: u32, param_id: u16, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(7 + data.len());
    buf.put_u8(Command::StmtSendLongData as u8);
    buf.put_u32_le(statement_id);
    buf.put_u16_le(param_id);
    buf.put_slice(data);
    buf.freeze()
}

fn encode_with_id(command: Command, statement_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(command as u8);
    buf.put_u32_le(statement_id);
    buf.freeze()
}

/// Encode a COM_STMT_CLOSE payload.
#[must_use]
pub fn encode_close(statement_id: u32) -> Bytes {
    encode_with_id(Command::StmtClose, statement_id)
}

/// Encode a COM_STMT_RESET payload.
#[must_use]
pub fn encode_reset(statement_id: u32) -> Bytes {
    encode_with_id(Command::StmtReset, statement_id)
}

/// Encode a COM_STMT_FETCH payload.
#[must_use]
pub fn encode_fetch(statement_id: u32, rows: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(Command::StmtFetch as u8);
    buf.put_u32_le(statement_id);
    buf.put_u32_le(rows);
    buf.freeze()
}

/// Read the statement id and parameter id of a COM_STMT_SEND_LONG_DATA
/// payload, leaving the data in `src`. Used by test servers.
pub fn decode_send_long_data(src: &mut impl Buf) -> Result<(u32, u16), ProtocolError> {
    let _command = read_u8(src)?;
    Ok((read_u32(src)?, read_u16(src)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_null_bitmap_len() {
        assert_eq!(null_bitmap_len(0, 0), 0);
        assert_eq!(null_bitmap_len(1, 0), 1);
        assert_eq!(null_bitmap_len(8, 0), 1);
        assert_eq!(null_bitmap_len(9, 0), 2);
        assert_eq!(null_bitmap_len(6, BINARY_ROW_NULL_OFFSET), 1);
        assert_eq!(null_bitmap_len(7, BINARY_ROW_NULL_OFFSET), 2);
    }

    #[test]
    fn test_bitmap_lookup() {
        let bitmap = [0b0000_0100, 0b0000_0001];
        assert!(is_null_in_bitmap(&bitmap, 0, 2));
        assert!(!is_null_in_bitmap(&bitmap, 1, 2));
        assert!(is_null_in_bitmap(&bitmap, 6, 2));
        assert!(!is_null_in_bitmap(&bitmap, 40, 2));
    }

    #[test]
    fn test_prepare_ok() {
        let mut buf: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00];
        let ok = PrepareOk::decode(&mut buf).unwrap();
        assert_eq!(ok.statement_id, 1);
        assert_eq!(ok.num_columns, 2);
        assert_eq!(ok.num_params, 3);
        assert_eq!(ok.warnings, 0);
    }

    #[test]
    fn test_encode_execute() {
        let params = vec![
            ExecuteParam {
                column_type: ColumnType::LongLong,
                unsigned: false,
                value: ParamValue::Bytes(Bytes::copy_from_slice(&5i64.to_le_bytes())),
            },
            ExecuteParam::null(),
            ExecuteParam {
                column_type: ColumnType::VarString,
                unsigned: false,
                value: ParamValue::Bytes(Bytes::from_static(b"\x01x")),
            },
        ];
        let payload = encode_execute(7, &params);
        assert_eq!(payload[0], 0x17);
        assert_eq!(&payload[1..5], &7u32.to_le_bytes());
        assert_eq!(payload[5], 0);
        assert_eq!(&payload[6..10], &1u32.to_le_bytes());
        assert_eq!(payload[10], 0b0000_0010);
        assert_eq!(payload[11], 1);
        assert_eq!(&payload[12..18], &[0x08, 0x00, 0x06, 0x00, 0xFD, 0x00]);
        assert_eq!(&payload[18..26], &5i64.to_le_bytes());
        assert_eq!(&payload[26..], b"\x01x");

        let decoded = ExecuteRequest::decode(&mut payload.clone(), 3).unwrap();
        assert_eq!(decoded.statement_id, 7);
        assert!(decoded.is_null(1));
        assert!(!decoded.is_null(0));
        assert_eq!(decoded.types[2], (ColumnType::VarString, false));
        assert_eq!(decoded.values.len(), 10);
    }

    #[test]
    fn test_encode_execute_without_params() {
        let payload = encode_execute(1, &[]);
        assert_eq!(payload.len(), 10);
    }

    #[test]
    fn test_long_data_slot_has_no_value() {
        let payload = encode_execute(2, &[ExecuteParam::long_data()]);
        // header(10) + bitmap(1) + bound(1) + types(2), no value bytes
        assert_eq!(payload.len(), 14);
        assert_eq!(payload[10], 0);
    }

    #[test]
    fn test_small_commands() {
        assert_eq!(&encode_close(9)[..], &[0x19, 9, 0, 0, 0]);
        assert_eq!(&encode_reset(9)[..], &[0x1A, 9, 0, 0, 0]);
        let long = encode_send_long_data(3, 1, b"abc");
        assert_eq!(&long[..], &[0x18, 3, 0, 0, 0, 1, 0, b'a', b'b', b'c']);
        let mut cursor = long.clone();
        assert_eq!(decode_send_long_data(&mut cursor).unwrap(), (3, 1));
        assert_eq!(&cursor[..], b"abc");
        assert_eq!(encode_fetch(1, 10).len(), 9);
    }
}
