//! # mysql-protocol
//!
//! Pure implementation of the MySQL client/server protocol (protocol 4.1,
//! handshake v10) as spoken by MySQL and compatible servers.
//!
//! This crate provides packet structures, primitive codecs and the
//! connection-phase and command-phase messages. It is IO-agnostic: it
//! contains no networking logic and makes no assumptions about the async
//! runtime. Higher-level crates build framing and connection handling on
//! top of it.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use mysql_protocol::codec::{read_lenenc_int, write_lenenc_int};
//!
//! let mut buf = BytesMut::new();
//! write_lenenc_int(&mut buf, 300);
//! assert_eq!(&buf[..], &[0xFC, 0x2C, 0x01]);
//! assert_eq!(read_lenenc_int(&mut buf.freeze()).unwrap(), 300);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod column;
pub mod command;
pub mod error;
pub mod flags;
pub mod handshake;
pub mod packet;
pub mod response;
pub mod statement;
pub mod types;

pub use column::ColumnDefinition;
pub use command::Command;
pub use error::ProtocolError;
pub use flags::{CapabilityFlags, ColumnFlags, StatusFlags, charset};
pub use handshake::{AuthMoreData, AuthSwitchRequest, HandshakeResponse, HandshakeV10, SslRequest};
pub use packet::{
    COMPRESSED_HEADER_SIZE, CompressedHeader, DEFAULT_MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
    PACKET_HEADER_SIZE, PacketHeader, ResponseKind,
};
pub use response::{EofPacket, ErrPacket, OkPacket, SessionStateChange};
pub use statement::{ExecuteParam, ExecuteRequest, ParamValue, PrepareOk};
pub use types::ColumnType;
