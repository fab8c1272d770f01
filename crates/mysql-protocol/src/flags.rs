//! Capability, server status and column flag sets.

use bitflags::bitflags;

bitflags! {
    /// Client/server capability flags exchanged during the handshake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilityFlags: u32 {
        /// Use the improved version of old password authentication.
        const LONG_PASSWORD = 1;
        /// Send found rows instead of affected rows.
        const FOUND_ROWS = 1 << 1;
        /// Get all column flags.
        const LONG_FLAG = 1 << 2;
        /// Database can be specified in the handshake response.
        const CONNECT_WITH_DB = 1 << 3;
        /// Do not permit `database.table.column`.
        const NO_SCHEMA = 1 << 4;
        /// Compression protocol supported.
        const COMPRESS = 1 << 5;
        /// ODBC client.
        const ODBC = 1 << 6;
        /// Can use LOAD DATA LOCAL.
        const LOCAL_FILES = 1 << 7;
        /// Ignore spaces before `(`.
        const IGNORE_SPACE = 1 << 8;
        /// 4.1 protocol.
        const PROTOCOL_41 = 1 << 9;
        /// Interactive client.
        const INTERACTIVE = 1 << 10;
        /// Switch to TLS after the handshake.
        const SSL = 1 << 11;
        /// Ignore SIGPIPE.
        const IGNORE_SIGPIPE = 1 << 12;
        /// Client knows about transactions.
        const TRANSACTIONS = 1 << 13;
        /// Old 4.1 protocol flag.
        const RESERVED = 1 << 14;
        /// 4.1 authentication.
        const SECURE_CONNECTION = 1 << 15;
        /// Multiple statements per COM_QUERY.
        const MULTI_STATEMENTS = 1 << 16;
        /// Multiple result sets.
        const MULTI_RESULTS = 1 << 17;
        /// Multiple result sets from prepared statements.
        const PS_MULTI_RESULTS = 1 << 18;
        /// Pluggable authentication.
        const PLUGIN_AUTH = 1 << 19;
        /// Connection attributes.
        const CONNECT_ATTRS = 1 << 20;
        /// Length-encoded auth response in the handshake response.
        const PLUGIN_AUTH_LENENC_CLIENT_DATA = 1 << 21;
        /// Client can handle expired passwords.
        const CAN_HANDLE_EXPIRED_PASSWORDS = 1 << 22;
        /// Session state change tracking in OK packets.
        const SESSION_TRACK = 1 << 23;
        /// OK packets replace EOF packets.
        const DEPRECATE_EOF = 1 << 24;
    }
}

impl CapabilityFlags {
    /// Capabilities this client always asks for.
    #[must_use]
    pub const fn client_default() -> Self {
        Self::LONG_PASSWORD
            .union(Self::LONG_FLAG)
            .union(Self::PROTOCOL_41)
            .union(Self::TRANSACTIONS)
            .union(Self::SECURE_CONNECTION)
            .union(Self::MULTI_STATEMENTS)
            .union(Self::MULTI_RESULTS)
            .union(Self::PS_MULTI_RESULTS)
            .union(Self::PLUGIN_AUTH)
            .union(Self::PLUGIN_AUTH_LENENC_CLIENT_DATA)
            .union(Self::SESSION_TRACK)
            .union(Self::DEPRECATE_EOF)
    }
}

bitflags! {
    /// Server status flags carried by OK and EOF packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u16 {
        /// A transaction is active.
        const IN_TRANS = 0x0001;
        /// Autocommit mode is on.
        const AUTOCOMMIT = 0x0002;
        /// Another result set follows.
        const MORE_RESULTS_EXISTS = 0x0008;
        /// No good index was used.
        const NO_GOOD_INDEX_USED = 0x0010;
        /// No index was used.
        const NO_INDEX_USED = 0x0020;
        /// A read-only cursor is open.
        const CURSOR_EXISTS = 0x0040;
        /// The last row of the cursor was sent.
        const LAST_ROW_SENT = 0x0080;
        /// A database was dropped.
        const DB_DROPPED = 0x0100;
        /// Backslash is not an escape character.
        const NO_BACKSLASH_ESCAPES = 0x0200;
        /// Prepared statement metadata changed.
        const METADATA_CHANGED = 0x0400;
        /// The query was logged as slow.
        const QUERY_WAS_SLOW = 0x0800;
        /// Result contains output parameters.
        const PS_OUT_PARAMS = 0x1000;
        /// A read-only transaction is active.
        const IN_TRANS_READONLY = 0x2000;
        /// Session state changed; the OK packet carries tracking data.
        const SESSION_STATE_CHANGED = 0x4000;
    }
}

bitflags! {
    /// Column definition flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColumnFlags: u16 {
        /// Column cannot be NULL.
        const NOT_NULL = 0x0001;
        /// Column is part of the primary key.
        const PRIMARY_KEY = 0x0002;
        /// Column is part of a unique key.
        const UNIQUE_KEY = 0x0004;
        /// Column is part of a non-unique key.
        const MULTIPLE_KEY = 0x0008;
        /// Column is a BLOB or TEXT.
        const BLOB = 0x0010;
        /// Integer column is unsigned.
        const UNSIGNED = 0x0020;
        /// Column is zero-filled.
        const ZEROFILL = 0x0040;
        /// Column has a binary collation.
        const BINARY = 0x0080;
        /// Column is an ENUM.
        const ENUM = 0x0100;
        /// Column is AUTO_INCREMENT.
        const AUTO_INCREMENT = 0x0200;
        /// Column is a TIMESTAMP.
        const TIMESTAMP = 0x0400;
        /// Column is a SET.
        const SET = 0x0800;
        /// Column has no default value.
        const NO_DEFAULT_VALUE = 0x1000;
        /// Column is updated with NOW() on update.
        const ON_UPDATE_NOW = 0x2000;
        /// Column is numeric.
        const NUM = 0x8000;
    }
}

/// Character set and collation ids used by the client.
pub mod charset {
    /// `utf8mb3_general_ci`.
    pub const UTF8_GENERAL_CI: u8 = 33;
    /// `utf8mb4_general_ci`.
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    /// `binary`: values are raw bytes.
    pub const BINARY: u8 = 63;
    /// `utf8mb4_0900_ai_ci` (MySQL 8 default).
    pub const UTF8MB4_0900_AI_CI: u8 = 255;
    /// `latin1_swedish_ci`.
    pub const LATIN1_SWEDISH_CI: u8 = 8;
    /// `ascii_general_ci`.
    pub const ASCII_GENERAL_CI: u8 = 11;

    /// Collation id for a charset or collation name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<u8> {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf8mb3" | "utf8_general_ci" | "utf8mb3_general_ci" => Some(UTF8_GENERAL_CI),
            "utf8mb4" | "utf8mb4_general_ci" => Some(UTF8MB4_GENERAL_CI),
            "utf8mb4_0900_ai_ci" => Some(UTF8MB4_0900_AI_CI),
            "binary" => Some(BINARY),
            "latin1" | "latin1_swedish_ci" => Some(LATIN1_SWEDISH_CI),
            "ascii" | "ascii_general_ci" => Some(ASCII_GENERAL_CI),
            _ => None,
        }
    }
}
