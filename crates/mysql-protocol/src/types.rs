//! MySQL column type definitions.
//!
//! The type tag appears in column definitions and in the parameter type
//! block of `COM_STMT_EXECUTE`.

use crate::error::ProtocolError;

/// Column type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    /// Legacy DECIMAL.
    Decimal = 0x00,
    /// TINYINT.
    Tiny = 0x01,
    /// SMALLINT.
    Short = 0x02,
    /// INT.
    Long = 0x03,
    /// FLOAT.
    Float = 0x04,
    /// DOUBLE.
    Double = 0x05,
    /// NULL literal.
    Null = 0x06,
    /// TIMESTAMP.
    Timestamp = 0x07,
    /// BIGINT.
    LongLong = 0x08,
    /// MEDIUMINT.
    Int24 = 0x09,
    /// DATE.
    Date = 0x0A,
    /// TIME.
    Time = 0x0B,
    /// DATETIME.
    DateTime = 0x0C,
    /// YEAR.
    Year = 0x0D,
    /// VARCHAR (internal).
    VarChar = 0x0F,
    /// BIT.
    Bit = 0x10,
    /// JSON.
    Json = 0xF5,
    /// DECIMAL / NUMERIC.
    NewDecimal = 0xF6,
    /// ENUM.
    Enum = 0xF7,
    /// SET.
    Set = 0xF8,
    /// TINYBLOB / TINYTEXT.
    TinyBlob = 0xF9,
    /// MEDIUMBLOB / MEDIUMTEXT.
    MediumBlob = 0xFA,
    /// LONGBLOB / LONGTEXT.
    LongBlob = 0xFB,
    /// BLOB / TEXT.
    Blob = 0xFC,
    /// VARCHAR / VARBINARY.
    VarString = 0xFD,
    /// CHAR / BINARY.
    String = 0xFE,
    /// Spatial types.
    Geometry = 0xFF,
}

impl ColumnType {
    /// Create a column type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x00 => Self::Decimal,
            0x01 => Self::Tiny,
            0x02 => Self::Short,
            0x03 => Self::Long,
            0x04 => Self::Float,
            0x05 => Self::Double,
            0x06 => Self::Null,
            0x07 => Self::Timestamp,
            0x08 => Self::LongLong,
            0x09 => Self::Int24,
            0x0A => Self::Date,
            0x0B => Self::Time,
            0x0C => Self::DateTime,
            0x0D => Self::Year,
            0x0F => Self::VarChar,
            0x10 => Self::Bit,
            0xF5 => Self::Json,
            0xF6 => Self::NewDecimal,
            0xF7 => Self::Enum,
            0xF8 => Self::Set,
            0xF9 => Self::TinyBlob,
            0xFA => Self::MediumBlob,
            0xFB => Self::LongBlob,
            0xFC => Self::Blob,
            0xFD => Self::VarString,
            0xFE => Self::String,
            0xFF => Self::Geometry,
            other => return Err(ProtocolError::UnknownColumnType(other)),
        })
    }

    /// Raw byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether values of this type are integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Tiny | Self::Short | Self::Long | Self::LongLong | Self::Int24 | Self::Year
        )
    }

    /// Whether values of this type are dates or times.
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            Self::Date | Self::Time | Self::DateTime | Self::Timestamp
        )
    }

    /// Whether values of this type travel as length-encoded strings in the
    /// binary protocol.
    #[must_use]
    pub const fn is_length_encoded(self) -> bool {
        matches!(
            self,
            Self::Decimal
                | Self::NewDecimal
                | Self::VarChar
                | Self::Bit
                | Self::Json
                | Self::Enum
                | Self::Set
                | Self::TinyBlob
                | Self::MediumBlob
                | Self::LongBlob
                | Self::Blob
                | Self::VarString
                | Self::String
                | Self::Geometry
        )
    }

    /// Fixed binary-protocol width in bytes, if the type has one.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Tiny => Some(1),
            Self::Short | Self::Year => Some(2),
            Self::Long | Self::Int24 | Self::Float => Some(4),
            Self::LongLong | Self::Double => Some(8),
            Self::Null => Some(0),
            _ => None,
        }
    }
}
