//! Per-connection metadata updated from server responses.

use std::collections::HashMap;

use mysql_protocol::{CapabilityFlags, ErrPacket, OkPacket, SessionStateChange, StatusFlags};

/// Server error as last reported on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// MySQL error code.
    pub code: u16,
    /// SQLSTATE.
    pub state: String,
    /// Error message.
    pub message: String,
}

/// Session state collected from `SESSION_TRACK` data in OK packets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Tracked system variables by name.
    pub system_variables: HashMap<String, String>,
    /// Current default schema.
    pub schema: Option<String>,
    /// Whether the server reported any session state change.
    pub state_changed: bool,
    /// GTIDs of the last committed transaction.
    pub gtids: Option<String>,
    /// Characteristics of the current transaction, as SQL.
    pub transaction_characteristics: Option<String>,
    /// Transaction state tracker string.
    pub transaction_state: Option<String>,
}

impl SessionState {
    fn apply(&mut self, change: &SessionStateChange) {
        match change {
            SessionStateChange::SystemVariable { name, value } => {
                self.system_variables.insert(name.clone(), value.clone());
            }
            SessionStateChange::Schema(schema) => self.schema = Some(schema.clone()),
            SessionStateChange::StateChanged(changed) => self.state_changed = *changed,
            SessionStateChange::Gtids(gtids) => self.gtids = Some(gtids.clone()),
            SessionStateChange::TransactionCharacteristics(sql) => {
                self.transaction_characteristics = Some(sql.clone());
            }
            SessionStateChange::TransactionState(state) => {
                self.transaction_state = Some(state.clone());
            }
            _ => {}
        }
    }
}

/// Connection metadata: server identity plus the outcome of the last
/// command.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ConnectionMetadata {
    /// Server version string from the handshake.
    pub server_version: String,
    /// Server-side connection (thread) id.
    pub connection_id: u32,
    /// Negotiated collation id.
    pub charset: u8,
    /// Negotiated capabilities.
    pub capabilities: CapabilityFlags,
    /// Status flags of the last OK or EOF packet.
    pub status: StatusFlags,
    /// Affected rows of the last statement.
    pub affected_rows: u64,
    /// Last insert id of the last statement.
    pub last_insert_id: u64,
    /// Warning count of the last statement.
    pub warnings: u16,
    /// Info string of the last OK packet.
    pub info: String,
    /// Last server error.
    pub last_error: Option<ServerError>,
    /// Tracked session state.
    pub session: SessionState,
}

impl ConnectionMetadata {
    pub(crate) fn record_ok(&mut self, ok: &OkPacket) {
        self.affected_rows = ok.affected_rows;
        self.last_insert_id = ok.last_insert_id;
        self.status = ok.status;
        self.warnings = ok.warnings;
        self.info.clone_from(&ok.info);
        for change in &ok.session_state {
            self.session.apply(change);
        }
    }

    pub(crate) fn record_eof(&mut self, status: StatusFlags, warnings: u16) {
        self.status = status;
        self.warnings = warnings;
    }

    pub(crate) fn record_error(&mut self, err: &ErrPacket) {
        self.last_error = Some(ServerError {
            code: err.code,
            state: err.sql_state.clone(),
            message: err.message.clone(),
        });
    }

    /// Check if the server reports an open transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.status.contains(StatusFlags::IN_TRANS)
    }

    /// Check if autocommit is on.
    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.status.contains(StatusFlags::AUTOCOMMIT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ok_applies_session_state() {
        let mut meta = ConnectionMetadata::default();
        let ok = OkPacket {
            affected_rows: 3,
            last_insert_id: 42,
            status: StatusFlags::AUTOCOMMIT | StatusFlags::IN_TRANS,
            warnings: 1,
            info: String::new(),
            session_state: vec![
                SessionStateChange::Schema("shop".into()),
                SessionStateChange::SystemVariable {
                    name: "autocommit".into(),
                    value: "ON".into(),
                },
                SessionStateChange::TransactionState("T_______".into()),
            ],
        };
        meta.record_ok(&ok);

        assert_eq!(meta.affected_rows, 3);
        assert_eq!(meta.last_insert_id, 42);
        assert!(meta.in_transaction());
        assert_eq!(meta.session.schema.as_deref(), Some("shop"));
        assert_eq!(meta.session.system_variables["autocommit"], "ON");
        assert_eq!(meta.session.transaction_state.as_deref(), Some("T_______"));
    }

    #[test]
    fn test_record_error() {
        let mut meta = ConnectionMetadata::default();
        meta.record_error(&ErrPacket::new(1064, "42000", "syntax"));
        let err = meta.last_error.unwrap();
        assert_eq!(err.code, 1064);
        assert_eq!(err.state, "42000");
    }
}
