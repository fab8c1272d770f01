//! Connection and parser state.
//!
//! ## State Transitions
//!
//! ```text
//! Unconnected -> Connecting   (connect started)
//! Connecting  -> Established  (initial handshake received)
//! Established -> Ready        (auth OK received)
//! any         -> Closing      (close requested)
//! any         -> Closed       (socket closed or fatal error)
//! ```
//!
//! Only `Ready` accepts commands.

use mysql_protocol::ProtocolError;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Nothing has happened yet.
    #[default]
    Unconnected,
    /// The socket is being opened.
    Connecting,
    /// The initial handshake arrived; authentication is running.
    Established,
    /// Authenticated and accepting commands.
    Ready,
    /// A close was requested; outstanding work is finishing.
    Closing,
    /// The socket is closed.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Unconnected, Connecting) | (Connecting, Established) | (Established, Ready) => true,
            (Closed, _) => false,
            (_, Closing) => self != Closing,
            (_, Closed) => true,
            _ => false,
        }
    }

    /// Move to `next`, failing on an illegal transition.
    pub fn transition(&mut self, next: Self) -> Result<(), ProtocolError> {
        if !self.can_transition_to(next) {
            return Err(ProtocolError::InvalidField {
                field: "connection state",
                reason: format!("illegal transition {self:?} -> {next:?}"),
            });
        }
        tracing::trace!(from = ?self, to = ?next, "connection state change");
        *self = next;
        Ok(())
    }

    /// Check if the connection accepts commands.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Check if the connection is going away or gone.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// What the processor expects the next packet to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// No command in flight.
    #[default]
    Idle,
    /// Waiting for the first packet of a response.
    AwaitingResponse,
    /// Reading result set column definitions. `remaining == 0` means the
    /// definitions are done and an EOF packet is expected.
    ColumnDefinitions {
        /// Definitions still to read.
        remaining: u64,
    },
    /// Reading rows until the EOF/OK terminator.
    Rows,
    /// Reading prepared statement parameter definitions.
    PrepareParams {
        /// Definitions still to read.
        remaining: u16,
    },
    /// Reading prepared statement column definitions.
    PrepareColumns {
        /// Definitions still to read.
        remaining: u16,
    },
    /// Reading COM_FIELD_LIST definitions until EOF.
    FieldList,
}

impl ParseMode {
    /// Check if no response is being read.
    #[must_use]
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = ConnectionState::default();
        state.transition(ConnectionState::Connecting).unwrap();
        state.transition(ConnectionState::Established).unwrap();
        state.transition(ConnectionState::Ready).unwrap();
        assert!(state.is_ready());
        state.transition(ConnectionState::Closing).unwrap();
        state.transition(ConnectionState::Closed).unwrap();
        assert!(state.is_closed());
    }

    #[test]
    fn test_illegal_transitions() {
        let mut state = ConnectionState::Unconnected;
        assert!(state.transition(ConnectionState::Ready).is_err());
        assert_eq!(state, ConnectionState::Unconnected);

        let mut state = ConnectionState::Closed;
        assert!(state.transition(ConnectionState::Ready).is_err());
        assert!(state.transition(ConnectionState::Closing).is_err());

        let mut state = ConnectionState::Ready;
        assert!(state.transition(ConnectionState::Established).is_err());
    }

    #[test]
    fn test_fatal_from_any_state() {
        for from in [
            ConnectionState::Unconnected,
            ConnectionState::Connecting,
            ConnectionState::Established,
            ConnectionState::Ready,
            ConnectionState::Closing,
        ] {
            assert!(from.can_transition_to(ConnectionState::Closed));
        }
    }
}
