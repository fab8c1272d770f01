//! Command phase request encoding.
//!
//! Each function returns a complete packet payload; framing and sequence ids
//! are the codec's job.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_null_terminated;
use crate::error::ProtocolError;

/// Command byte of a command phase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// COM_QUIT.
    Quit = 0x01,
    /// COM_INIT_DB.
    InitDb = 0x02,
    /// COM_QUERY.
    Query = 0x03,
    /// COM_FIELD_LIST.
    FieldList = 0x04,
    /// COM_PING.
    Ping = 0x0E,
    /// COM_STMT_PREPARE.
    StmtPrepare = 0x16,
    /// COM_STMT_EXECUTE.
    StmtExecute = 0x17,
    /// COM_STMT_SEND_LONG_DATA.
    StmtSendLongData = 0x18,
    /// COM_STMT_CLOSE.
    StmtClose = 0x19,
    /// COM_STMT_RESET.
    StmtReset = 0x1A,
    /// COM_STMT_FETCH.
    StmtFetch = 0x1C,
    /// COM_RESET_CONNECTION.
    ResetConnection = 0x1F,
}

impl Command {
    /// Create a command from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x01 => Self::Quit,
            0x02 => Self::InitDb,
            0x03 => Self::Query,
            0x04 => Self::FieldList,
            0x0E => Self::Ping,
            0x16 => Self::StmtPrepare,
            0x17 => Self::StmtExecute,
            0x18 => Self::StmtSendLongData,
            0x19 => Self::StmtClose,
            0x1A => Self::StmtReset,
            0x1C => Self::StmtFetch,
            0x1F => Self::ResetConnection,
            other => return Err(ProtocolError::UnknownCommand(other)),
        })
    }

    /// Whether the server answers this command.
    ///
    /// COM_STMT_SEND_LONG_DATA and COM_STMT_CLOSE are fire-and-forget; COM_QUIT
    /// is answered by closing the socket.
    #[must_use]
    pub const fn expects_response(self) -> bool {
        !matches!(self, Self::Quit | Self::StmtSendLongData | Self::StmtClose)
    }
}

fn with_text(command: Command, text: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + text.len());
    buf.put_u8(command as u8);
    buf.put_slice(text);
    buf.freeze()
}

/// Encode a COM_QUERY payload.
#[must_use]
pub fn encode_query(sql: &str) -> Bytes {
    with_text(Command::Query, sql.as_bytes())
}

/// Encode a COM_INIT_DB payload.
#[must_use]
pub fn encode_init_db(database: &str) -> Bytes {
    with_text(Command::InitDb, database.as_bytes())
}

/// Encode a COM_STMT_PREPARE payload.
#[must_use]
pub fn encode_prepare(sql: &str) -> Bytes {
    with_text(Command::StmtPrepare, sql.as_bytes())
}

/// Encode a COM_FIELD_LIST payload.
#[must_use]
pub fn encode_field_list(table: &str, wildcard: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + table.len() + wildcard.len());
    buf.put_u8(Command::FieldList as u8);
    write_null_terminated(&mut buf, table.as_bytes());
    buf.put_slice(wildcard.as_bytes());
    buf.freeze()
}

/// Encode a payload that is only the command byte.
#[must_use]
pub fn encode_simple(command: Command) -> Bytes {
    Bytes::copy_from_slice(&[command as u8])
}
