//! MySQL packet header definitions.

use bytes::{Buf, BufMut};

use crate::codec::{read_u24, write_u24};
use crate::error::ProtocolError;

/// Packet header size in bytes (3-byte length + 1-byte sequence id).
pub const PACKET_HEADER_SIZE: usize = 4;

/// Largest payload a single wire packet can carry.
///
/// A logical packet of this size or more is split into fragments of exactly
/// this length, terminated by a shorter (possibly empty) fragment.
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Compressed packet header size in bytes.
pub const COMPRESSED_HEADER_SIZE: usize = 7;

/// Default `max_allowed_packet` announced in the handshake response.
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// Leading byte of an OK packet.
pub const OK_HEADER: u8 = 0x00;

/// Leading byte of an ERR packet.
pub const ERR_HEADER: u8 = 0xFF;

/// Leading byte of an EOF packet (and of an auth switch request).
pub const EOF_HEADER: u8 = 0xFE;

/// Leading byte of a LOCAL INFILE request.
pub const LOCAL_INFILE_HEADER: u8 = 0xFB;

/// Payloads starting with `0xFE` that are shorter than this are EOF packets.
pub const EOF_MAX_LENGTH: usize = 9;

/// Plain packet header.
///
/// Every packet on the wire begins with a 4-byte header: the payload length
/// as a 3-byte little-endian integer and the sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length, excluding the header.
    pub length: u32,
    /// Sequence id (wraps at 255).
    pub sequence: u8,
}

impl PacketHeader {
    /// Create a new packet header.
    #[must_use]
    pub const fn new(length: u32, sequence: u8) -> Self {
        Self { length, sequence }
    }

    /// Parse a packet header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }
        let length = read_u24(src)?;
        let sequence = src.get_u8();
        Ok(Self { length, sequence })
    }

    /// Encode the packet header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_u24(dst, self.length);
        dst.put_u8(self.sequence);
    }

    /// Whether this fragment continues into the next one.
    #[must_use]
    pub const fn is_continued(&self) -> bool {
        self.length as usize == MAX_PAYLOAD_SIZE
    }
}

/// Header of a packet in the compressed protocol.
///
/// The envelope carries one or more plain packets, optionally deflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedHeader {
    /// Length of the (possibly compressed) payload that follows.
    pub compressed_length: u32,
    /// Compressed sequence id, independent of the inner packet sequence.
    pub sequence: u8,
    /// Length after inflation, or 0 when the payload is stored raw.
    pub uncompressed_length: u32,
}

impl CompressedHeader {
    /// Parse a compressed packet header.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < COMPRESSED_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: COMPRESSED_HEADER_SIZE,
                actual: src.remaining(),
            });
        }
        let compressed_length = read_u24(src)?;
        let sequence = src.get_u8();
        let uncompressed_length = read_u24(src)?;
        Ok(Self {
            compressed_length,
            sequence,
            uncompressed_length,
        })
    }

    /// Encode the compressed packet header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_u24(dst, self.compressed_length);
        dst.put_u8(self.sequence);
        write_u24(dst, self.uncompressed_length);
    }

    /// Whether the payload is stored without deflate.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        self.uncompressed_length == 0
    }
}

/// Coarse classification of a response payload by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// OK packet.
    Ok,
    /// ERR packet.
    Err,
    /// EOF packet (`0xFE` with a payload shorter than 9 bytes).
    Eof,
    /// LOCAL INFILE request.
    LocalInfile,
    /// Anything else: a result set column count.
    ColumnCount,
}

impl ResponseKind {
    /// Classify a top-level response payload.
    pub fn classify(payload: &[u8]) -> Result<Self, ProtocolError> {
        match payload.first() {
            None => Err(ProtocolError::UnexpectedEof),
            Some(&OK_HEADER) => Ok(Self::Ok),
            Some(&ERR_HEADER) => Ok(Self::Err),
            Some(&EOF_HEADER) if payload.len() < EOF_MAX_LENGTH => Ok(Self::Eof),
            Some(&LOCAL_INFILE_HEADER) => Ok(Self::LocalInfile),
            Some(_) => Ok(Self::ColumnCount),
        }
    }
}

/// Whether a payload is an EOF packet.
#[must_use]
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&EOF_HEADER) && payload.len() < EOF_MAX_LENGTH
}

/// Whether a payload is an ERR packet.
#[must_use]
pub fn is_err_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&ERR_HEADER)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_roundtrip() {
        let header = PacketHeader::new(0x01_02_03, 7);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0x03, 0x02, 0x01, 0x07]);
        let decoded = PacketHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_incomplete() {
        let mut buf: &[u8] = &[0x01, 0x00];
        assert!(matches!(
            PacketHeader::decode(&mut buf),
            Err(ProtocolError::IncompletePacket { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_continued_fragment() {
        assert!(PacketHeader::new(MAX_PAYLOAD_SIZE as u32, 0).is_continued());
        assert!(!PacketHeader::new(10, 0).is_continued());
    }

    #[test]
    fn test_compressed_header() {
        let header = CompressedHeader {
            compressed_length: 20,
            sequence: 3,
            uncompressed_length: 0,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), COMPRESSED_HEADER_SIZE);
        let decoded = CompressedHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_raw());
    }

    #[test]
    fn test_classify() {
        assert_eq!(ResponseKind::classify(&[0x00, 0, 0]).unwrap(), ResponseKind::Ok);
        assert_eq!(ResponseKind::classify(&[0xFF, 0x15, 0x04]).unwrap(), ResponseKind::Err);
        assert_eq!(
            ResponseKind::classify(&[0xFE, 0, 0, 0x02, 0]).unwrap(),
            ResponseKind::Eof
        );
        assert_eq!(ResponseKind::classify(&[0xFB, b'f']).unwrap(), ResponseKind::LocalInfile);
        assert_eq!(ResponseKind::classify(&[0x03]).unwrap(), ResponseKind::ColumnCount);
        // A 0xFE with a long payload is a length-encoded column count.
        assert_eq!(
            ResponseKind::classify(&[0xFE, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            ResponseKind::ColumnCount
        );
        assert!(ResponseKind::classify(&[]).is_err());
    }

    #[test]
    fn test_eof_length_boundary() {
        // A row cannot start with 0xFE unless an 8-byte length follows.
        assert!(is_eof_packet(&[0xFE, 0, 0, 0x02, 0]));
        assert!(is_eof_packet(&[0xFE, 0, 0, 0x02, 0, 0, 0, 0]));
        assert!(!is_eof_packet(&[0xFE, 1, 0, 0, 0, 0, 0, 0, 0]));
        assert!(!is_eof_packet(&[0x00, 0, 0]));
    }
}
