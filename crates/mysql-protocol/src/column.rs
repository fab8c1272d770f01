//! Column definition packets (protocol 4.1).

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    read_fixed, read_lenenc_bytes, read_lenenc_int, read_lenenc_string, read_u8, read_u16,
    read_u32, write_lenenc_bytes, write_lenenc_int, write_lenenc_str,
};
use crate::error::ProtocolError;
use crate::flags::ColumnFlags;
use crate::types::ColumnType;

/// Length of the fixed-width block inside a column definition.
const FIXED_FIELDS_LEN: u64 = 0x0C;

/// Column definition sent ahead of result set rows, after a prepare, and in
/// reply to COM_FIELD_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Catalog (always `def`).
    pub catalog: String,
    /// Schema name.
    pub schema: String,
    /// Virtual table name (alias).
    pub table: String,
    /// Physical table name.
    pub org_table: String,
    /// Virtual column name (alias).
    pub name: String,
    /// Physical column name.
    pub org_name: String,
    /// Collation id.
    pub charset: u16,
    /// Maximum column length.
    pub column_length: u32,
    /// Column type tag.
    pub column_type: ColumnType,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Number of decimals for numeric and temporal types.
    pub decimals: u8,
    /// Default value, only present in COM_FIELD_LIST replies.
    pub default_value: Option<Bytes>,
}

impl ColumnDefinition {
    /// Create a column definition with the given name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            catalog: "def".into(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            org_name: name.clone(),
            name,
            charset: 45,
            column_length: 0,
            column_type,
            flags: ColumnFlags::empty(),
            decimals: 0,
            default_value: None,
        }
    }

    /// Set the collation id.
    #[must_use]
    pub fn with_charset(mut self, charset: u16) -> Self {
        self.charset = charset;
        self
    }

    /// Set the column flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        self.org_table = table.clone();
        self.table = table;
        self
    }

    /// Whether the column holds unsigned integers.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }

    /// Whether the column can hold NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        !self.flags.contains(ColumnFlags::NOT_NULL)
    }

    /// Decode a column definition payload.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let catalog = read_lenenc_string(src)?;
        let schema = read_lenenc_string(src)?;
        let table = read_lenenc_string(src)?;
        let org_table = read_lenenc_string(src)?;
        let name = read_lenenc_string(src)?;
        let org_name = read_lenenc_string(src)?;

        let fixed_len = read_lenenc_int(src)?;
        if fixed_len < FIXED_FIELDS_LEN {
            return Err(ProtocolError::InvalidField {
                field: "column definition",
                reason: format!("fixed block is {fixed_len} bytes"),
            });
        }
        let charset = read_u16(src)?;
        let column_length = read_u32(src)?;
        let column_type = ColumnType::from_u8(read_u8(src)?)?;
        let flags = ColumnFlags::from_bits_retain(read_u16(src)?);
        let decimals = read_u8(src)?;
        // Filler plus any bytes a newer server added to the fixed block.
        let _filler = read_fixed(src, (fixed_len - FIXED_FIELDS_LEN + 2) as usize)?;

        let default_value = if src.has_remaining() {
            Some(read_lenenc_bytes(src)?)
        } else {
            None
        };

        Ok(Self {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            column_length,
            column_type,
            flags,
            decimals,
            default_value,
        })
    }

    /// Encode the column definition. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_lenenc_str(dst, &self.catalog);
        write_lenenc_str(dst, &self.schema);
        write_lenenc_str(dst, &self.table);
        write_lenenc_str(dst, &self.org_table);
        write_lenenc_str(dst, &self.name);
        write_lenenc_str(dst, &self.org_name);
        write_lenenc_int(dst, FIXED_FIELDS_LEN);
        dst.put_u16_le(self.charset);
        dst.put_u32_le(self.column_length);
        dst.put_u8(self.column_type.as_u8());
        dst.put_u16_le(self.flags.bits());
        dst.put_u8(self.decimals);
        dst.put_u16_le(0);
        if let Some(default) = &self.default_value {
            write_lenenc_bytes(dst, default);
        }
    }
}
