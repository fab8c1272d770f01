//! Generic response packets: OK, ERR and EOF.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    read_fixed, read_lenenc_bytes, read_lenenc_int, read_lenenc_string, read_u8, read_u16,
    write_lenenc_bytes, write_lenenc_int, write_lenenc_str,
};
use crate::error::ProtocolError;
use crate::flags::{CapabilityFlags, StatusFlags};
use crate::packet::{EOF_HEADER, ERR_HEADER, OK_HEADER};

/// One entry of the session state tracking block in an OK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateChange {
    /// A tracked system variable changed.
    SystemVariable {
        /// Variable name.
        name: String,
        /// New value.
        value: String,
    },
    /// The default schema changed.
    Schema(String),
    /// Some session state changed.
    StateChanged(bool),
    /// GTIDs of the last transaction.
    Gtids(String),
    /// Transaction characteristics, replayable as SQL.
    TransactionCharacteristics(String),
    /// Transaction state, as the 8-character tracker string.
    TransactionState(String),
    /// Tracker type this implementation does not interpret.
    Unknown {
        /// Tracker type byte.
        kind: u8,
        /// Raw tracker data.
        data: Bytes,
    },
}

impl SessionStateChange {
    const SYSTEM_VARIABLES: u8 = 0x00;
    const SCHEMA: u8 = 0x01;
    const STATE_CHANGE: u8 = 0x02;
    const GTIDS: u8 = 0x03;
    const TRANSACTION_CHARACTERISTICS: u8 = 0x04;
    const TRANSACTION_STATE: u8 = 0x05;

    /// Decode every entry of a session state block.
    pub fn decode_all(src: &mut impl Buf) -> Result<Vec<Self>, ProtocolError> {
        let mut out = Vec::new();
        while src.has_remaining() {
            let kind = read_u8(src)?;
            let mut data = read_lenenc_bytes(src)?;
            let entry = match kind {
                Self::SYSTEM_VARIABLES => Self::SystemVariable {
                    name: read_lenenc_string(&mut data)?,
                    value: read_lenenc_string(&mut data)?,
                },
                Self::SCHEMA => Self::Schema(read_lenenc_string(&mut data)?),
                Self::STATE_CHANGE => Self::StateChanged(read_lenenc_string(&mut data)? == "1"),
                Self::GTIDS => {
                    let _encoding_spec = read_u8(&mut data)?;
                    Self::Gtids(read_lenenc_string(&mut data)?)
                }
                Self::TRANSACTION_CHARACTERISTICS => {
                    Self::TransactionCharacteristics(read_lenenc_string(&mut data)?)
                }
                Self::TRANSACTION_STATE => Self::TransactionState(read_lenenc_string(&mut data)?),
                kind => Self::Unknown { kind, data },
            };
            out.push(entry);
        }
        Ok(out)
    }

    /// Encode one entry. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut data = BytesMut::new();
        let kind = match self {
            Self::SystemVariable { name, value } => {
                write_lenenc_str(&mut data, name);
                write_lenenc_str(&mut data, value);
                Self::SYSTEM_VARIABLES
            }
            Self::Schema(name) => {
                write_lenenc_str(&mut data, name);
                Self::SCHEMA
            }
            Self::StateChanged(changed) => {
                write_lenenc_str(&mut data, if *changed { "1" } else { "0" });
                Self::STATE_CHANGE
            }
            Self::Gtids(gtids) => {
                data.put_u8(0);
                write_lenenc_str(&mut data, gtids);
                Self::GTIDS
            }
            Self::TransactionCharacteristics(sql) => {
                write_lenenc_str(&mut data, sql);
                Self::TRANSACTION_CHARACTERISTICS
            }
            Self::TransactionState(state) => {
                write_lenenc_str(&mut data, state);
                Self::TRANSACTION_STATE
            }
            Self::Unknown { kind, data: raw } => {
                data.extend_from_slice(raw);
                *kind
            }
        };
        dst.put_u8(kind);
        write_lenenc_bytes(dst, &data);
    }
}

/// OK packet.
///
/// Also used as the result-set terminator when `DEPRECATE_EOF` is
/// negotiated, in which case its header byte is `0xFE`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OkPacket {
    /// Rows affected by the statement.
    pub affected_rows: u64,
    /// Last AUTO_INCREMENT id generated.
    pub last_insert_id: u64,
    /// Server status.
    pub status: StatusFlags,
    /// Warning count.
    pub warnings: u16,
    /// Human-readable info string.
    pub info: String,
    /// Session state changes.
    pub session_state: Vec<SessionStateChange>,
}

impl OkPacket {
    /// Decode an OK packet, including its header byte.
    pub fn decode(src: &mut impl Buf, capabilities: CapabilityFlags) -> Result<Self, ProtocolError> {
        let header = read_u8(src)?;
        if header != OK_HEADER && header != EOF_HEADER {
            return Err(ProtocolError::UnexpectedPacket {
                header,
                context: "OK packet",
            });
        }
        let affected_rows = read_lenenc_int(src)?;
        let last_insert_id = read_lenenc_int(src)?;

        let (status, warnings) = if capabilities.contains(CapabilityFlags::PROTOCOL_41) {
            (StatusFlags::from_bits_retain(read_u16(src)?), read_u16(src)?)
        } else if capabilities.contains(CapabilityFlags::TRANSACTIONS) {
            (StatusFlags::from_bits_retain(read_u16(src)?), 0)
        } else {
            (StatusFlags::empty(), 0)
        };

        let mut info = String::new();
        let mut session_state = Vec::new();
        if capabilities.contains(CapabilityFlags::SESSION_TRACK) {
            if src.has_remaining() {
                info = lossy(&read_lenenc_bytes(src)?);
            }
            if status.contains(StatusFlags::SESSION_STATE_CHANGED) && src.has_remaining() {
                let mut block = read_lenenc_bytes(src)?;
                session_state = SessionStateChange::decode_all(&mut block)?;
            }
        } else {
            info = lossy(&src.copy_to_bytes(src.remaining()));
        }

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
            session_state,
        })
    }

    /// Encode an OK packet with the `0x00` header. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut, capabilities: CapabilityFlags) {
        self.encode_with_header(dst, capabilities, OK_HEADER);
    }

    /// Encode an OK packet with an explicit header byte. Used by test
    /// servers to terminate result sets under `DEPRECATE_EOF`.
    pub fn encode_with_header(&self, dst: &mut impl BufMut, capabilities: CapabilityFlags, header: u8) {
        dst.put_u8(header);
        write_lenenc_int(dst, self.affected_rows);
        write_lenenc_int(dst, self.last_insert_id);
        let mut status = self.status;
        if !self.session_state.is_empty() {
            status |= StatusFlags::SESSION_STATE_CHANGED;
        }
        dst.put_u16_le(status.bits());
        dst.put_u16_le(self.warnings);
        if capabilities.contains(CapabilityFlags::SESSION_TRACK) {
            write_lenenc_str(dst, &self.info);
            if !self.session_state.is_empty() {
                let mut block = BytesMut::new();
                for entry in &self.session_state {
                    entry.encode(&mut block);
                }
                write_lenenc_bytes(dst, &block);
            }
        } else {
            dst.put_slice(self.info.as_bytes());
        }
    }
}

/// ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// Server error code.
    pub code: u16,
    /// Five-character SQLSTATE, `HY000` when the server sends none.
    pub sql_state: String,
    /// Error message.
    pub message: String,
}

impl ErrPacket {
    /// SQLSTATE used when the packet carries none.
    pub const GENERIC_STATE: &'static str = "HY000";

    /// Create an ERR packet.
    #[must_use]
    pub fn new(code: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    /// Decode an ERR packet, including its `0xFF` header byte.
    ///
    /// The SQLSTATE marker is optional: servers omit it when rejecting a
    /// connection before capabilities are negotiated.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let header = read_u8(src)?;
        if header != ERR_HEADER {
            return Err(ProtocolError::UnexpectedPacket {
                header,
                context: "ERR packet",
            });
        }
        let code = read_u16(src)?;
        let sql_state = if src.has_remaining() && src.chunk()[0] == b'#' {
            src.advance(1);
            lossy(&read_fixed(src, 5)?)
        } else {
            Self::GENERIC_STATE.to_owned()
        };
        let message = lossy(&src.copy_to_bytes(src.remaining()));
        Ok(Self {
            code,
            sql_state,
            message,
        })
    }

    /// Encode an ERR packet. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(ERR_HEADER);
        dst.put_u16_le(self.code);
        dst.put_u8(b'#');
        let mut state = [b'0'; 5];
        for (slot, byte) in state.iter_mut().zip(self.sql_state.bytes()) {
            *slot = byte;
        }
        dst.put_slice(&state);
        dst.put_slice(self.message.as_bytes());
    }
}

/// EOF packet (pre-`DEPRECATE_EOF` terminator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EofPacket {
    /// Warning count.
    pub warnings: u16,
    /// Server status.
    pub status: StatusFlags,
}

impl EofPacket {
    /// Decode an EOF packet, including its `0xFE` header byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let header = read_u8(src)?;
        if header != EOF_HEADER {
            return Err(ProtocolError::UnexpectedPacket {
                header,
                context: "EOF packet",
            });
        }
        // Pre-4.1 EOF packets carry only the header.
        if src.remaining() < 4 {
            return Ok(Self::default());
        }
        let warnings = read_u16(src)?;
        let status = StatusFlags::from_bits_retain(read_u16(src)?);
        Ok(Self { warnings, status })
    }

    /// Encode an EOF packet. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(EOF_HEADER);
        dst.put_u16_le(self.warnings);
        dst.put_u16_le(self.status.bits());
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn caps() -> CapabilityFlags {
        CapabilityFlags::client_default()
    }

    #[test]
    fn test_decode_ok_captured() {
        // INSERT into an AUTO_INCREMENT table: 1 row, id 5, autocommit.
        let mut buf: &[u8] = &[0x00, 0x01, 0x05, 0x02, 0x00, 0x00, 0x00];
        let ok = OkPacket::decode(&mut buf, caps()).unwrap();
        assert_eq!(ok.affected_rows, 1);
        assert_eq!(ok.last_insert_id, 5);
        assert_eq!(ok.status, StatusFlags::AUTOCOMMIT);
        assert_eq!(ok.warnings, 0);
        assert!(ok.info.is_empty());
    }

    #[test]
    fn test_decode_ok_with_session_state() {
        // USE test with SESSION_TRACK: schema tracker entry.
        let mut buf: &[u8] = &[
            0x00, 0x00, 0x00, 0x02, 0x40, 0x00, 0x00, // header, rows, id, status, warnings
            0x00, // empty info
            0x07, // state block length
            0x01, 0x05, 0x04, b't', b'e', b's', b't',
        ];
        let ok = OkPacket::decode(&mut buf, caps()).unwrap();
        assert!(ok.status.contains(StatusFlags::SESSION_STATE_CHANGED));
        assert_eq!(ok.session_state, vec![SessionStateChange::Schema("test".into())]);
    }

    #[test]
    fn test_session_state_roundtrip() {
        let ok = OkPacket {
            affected_rows: 3,
            status: StatusFlags::AUTOCOMMIT | StatusFlags::IN_TRANS,
            info: "Rows matched: 3".into(),
            session_state: vec![
                SessionStateChange::SystemVariable {
                    name: "autocommit".into(),
                    value: "OFF".into(),
                },
                SessionStateChange::StateChanged(true),
                SessionStateChange::Gtids("3E11FA47-71CA-11E1-9E33-C80AA9429562:23".into()),
                SessionStateChange::TransactionState("T_______".into()),
            ],
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        ok.encode(&mut buf, caps());
        let decoded = OkPacket::decode(&mut buf.freeze(), caps()).unwrap();
        assert_eq!(decoded.session_state, ok.session_state);
        assert_eq!(decoded.info, ok.info);
        assert_eq!(decoded.affected_rows, 3);
    }

    #[test]
    fn test_decode_ok_without_session_track() {
        let caps = CapabilityFlags::PROTOCOL_41;
        let mut buf: &[u8] = b"\x00\x00\x00\x02\x00\x00\x00hello";
        let ok = OkPacket::decode(&mut buf, caps).unwrap();
        assert_eq!(ok.info, "hello");
    }

    #[test]
    fn test_decode_err_captured() {
        // ERROR 1146 (42S02): Table 'test.nope' doesn't exist
        let mut payload = vec![0xFF, 0x7A, 0x04, b'#'];
        payload.extend_from_slice(b"42S02");
        payload.extend_from_slice(b"Table 'test.nope' doesn't exist");
        let err = ErrPacket::decode(&mut payload.as_slice()).unwrap();
        assert_eq!(err.code, 1146);
        assert_eq!(err.sql_state, "42S02");
        assert_eq!(err.message, "Table 'test.nope' doesn't exist");
    }

    #[test]
    fn test_decode_err_without_state() {
        let mut buf: &[u8] = b"\xff\x69\x04Host is blocked";
        let err = ErrPacket::decode(&mut buf).unwrap();
        assert_eq!(err.code, 1129);
        assert_eq!(err.sql_state, "HY000");
        assert_eq!(err.message, "Host is blocked");
    }

    #[test]
    fn test_err_roundtrip() {
        let err = ErrPacket::new(1064, "42000", "You have an error in your SQL syntax");
        let mut buf = BytesMut::new();
        err.encode(&mut buf);
        assert_eq!(ErrPacket::decode(&mut buf.freeze()).unwrap(), err);
    }

    #[test]
    fn test_decode_eof() {
        let mut buf: &[u8] = &[0xFE, 0x01, 0x00, 0x0A, 0x00];
        let eof = EofPacket::decode(&mut buf).unwrap();
        assert_eq!(eof.warnings, 1);
        assert!(eof.status.contains(StatusFlags::MORE_RESULTS_EXISTS));
        assert!(eof.status.contains(StatusFlags::AUTOCOMMIT));
    }

    #[test]
    fn test_ok_with_eof_header() {
        let ok = OkPacket {
            status: StatusFlags::AUTOCOMMIT,
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        ok.encode_with_header(&mut buf, caps(), EOF_HEADER);
        assert_eq!(buf[0], 0xFE);
        let decoded = OkPacket::decode(&mut buf.freeze(), caps()).unwrap();
        assert_eq!(decoded.status, StatusFlags::AUTOCOMMIT);
    }
}
