//! # mysql-codec
//!
//! Async framing layer for MySQL packets.
//!
//! This crate turns raw byte streams into logical MySQL packets, joining
//! payloads split into 16 MiB fragments and unwrapping the optional zlib
//! compression layer. It also tracks and validates packet sequence ids.
//!
//! ## Architecture
//!
//! ```text
//! TCP/TLS stream → CompressedFramer (optional) → PacketFramer → PacketCodec → client
//! ```
//!
//! [`PacketFramer`] and [`CompressedFramer`] are plain push state machines
//! with no IO. [`PacketCodec`] adapts them to tokio-util's
//! `Decoder`/`Encoder`, and [`PacketStream`] wraps the resulting `Framed`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compress;
pub mod error;
pub mod framed;
pub mod framer;
pub mod packet_codec;

pub use compress::{CompressedFramer, MIN_COMPRESS_LENGTH, write_compressed};
pub use error::CodecError;
pub use framed::PacketStream;
pub use framer::{Packet, PacketFramer, fragment_count, write_fragments};
pub use packet_codec::{DEFAULT_MAX_PACKET_SIZE, PacketCodec};
