//! MySQL packet codec implementation.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::compress::{CompressedFramer, write_compressed};
use crate::error::CodecError;
use crate::framer::{Packet, PacketFramer, write_fragments};

/// Default limit for a single logical packet (1 GiB, the server maximum).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1 << 30;

/// MySQL packet codec for tokio-util framing.
///
/// Decoding yields complete logical packets with fragments already joined.
/// Encoding takes a payload and splits it into fragments. The codec owns
/// the sequence counter: it is reset with [`PacketCodec::reset_sequence`]
/// at the start of each command and advanced by every packet sent or
/// received. A received packet with an unexpected sequence id is an error.
pub struct PacketCodec {
    framer: PacketFramer,
    compressed: Option<CompressedFramer>,
    ready: VecDeque<Packet>,
    sequence: u8,
}

impl PacketCodec {
    /// Create a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_packet_size(DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create a new codec with a custom maximum logical packet size.
    #[must_use]
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            framer: PacketFramer::new(max_packet_size),
            compressed: None,
            ready: VecDeque::new(),
            sequence: 0,
        }
    }

    /// Reset the sequence counters for a new command.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
        if let Some(compressed) = &mut self.compressed {
            compressed.set_sequence(0);
        }
    }

    /// Sequence id the next packet will carry.
    #[must_use]
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Override the sequence counter.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Switch to the compressed protocol for all following packets.
    ///
    /// Must be called on a packet boundary, with nothing buffered.
    pub fn enable_compression(&mut self) {
        if self.compressed.is_none() {
            let framer = PacketFramer::new(self.framer.max_packet_size());
            let mut compressed = CompressedFramer::new(framer);
            compressed.set_sequence(self.sequence);
            self.compressed = Some(compressed);
            tracing::debug!("compression enabled");
        }
    }

    /// Whether the compressed protocol is active.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed.is_some()
    }

    /// Whether a packet is partially received.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        match &self.compressed {
            Some(compressed) => compressed.has_partial(),
            None => self.framer.has_partial(),
        }
    }

    fn accept(&mut self, packet: Packet) -> Result<Packet, CodecError> {
        // Inside compressed envelopes servers number inner packets from the
        // compressed counter, so only the envelope sequence is checked.
        if self.compressed.is_none() && packet.sequence != self.sequence {
            return Err(CodecError::SequenceMismatch {
                expected: self.sequence,
                actual: packet.sequence,
            });
        }
        self.sequence = packet.last_sequence.wrapping_add(1);
        tracing::trace!(
            sequence = packet.sequence,
            length = packet.payload.len(),
            "decoded MySQL packet"
        );
        Ok(packet)
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(packet) = self.ready.pop_front() {
            return self.accept(packet).map(Some);
        }

        if let Some(compressed) = &mut self.compressed {
            let packets = compressed.push(&src[..])?;
            src.clear();
            self.ready.extend(packets);
            return match self.ready.pop_front() {
                Some(packet) => self.accept(packet).map(Some),
                None => Ok(None),
            };
        }

        while src.has_remaining() {
            let (consumed, packet) = self.framer.feed(&src[..])?;
            src.advance(consumed);
            if let Some(packet) = packet {
                return self.accept(packet).map(Some);
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }
        if self.has_partial() || !src.is_empty() {
            let buffered = src.len();
            src.clear();
            self.framer.clear();
            if let Some(compressed) = &mut self.compressed {
                compressed.clear();
            }
            return Err(CodecError::Truncated(buffered));
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let first = self.sequence;
        match &mut self.compressed {
            None => {
                self.sequence = write_fragments(dst, &payload, self.sequence);
            }
            Some(compressed) => {
                let mut plain = BytesMut::new();
                self.sequence = write_fragments(&mut plain, &payload, self.sequence);
                let next = write_compressed(dst, &plain, compressed.sequence())?;
                compressed.set_sequence(next);
            }
        }
        tracing::trace!(
            sequence = first,
            length = payload.len(),
            compressed = self.compressed.is_some(),
            "encoded MySQL packet"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mysql_protocol::packet::MAX_PAYLOAD_SIZE;

    #[test]
    fn test_encode_decode_sequence() {
        let mut client = PacketCodec::new();
        let mut wire = BytesMut::new();
        client.encode(Bytes::from_static(b"\x03SELECT 1"), &mut wire).unwrap();
        assert_eq!(client.sequence(), 1);
        assert_eq!(&wire[..4], &[9, 0, 0, 0]);

        let mut server = PacketCodec::new();
        let packet = server.decode(&mut wire).unwrap().unwrap();
        assert_eq!(&packet.payload[..], b"\x03SELECT 1");
        assert_eq!(server.sequence(), 1);
    }

    #[test]
    fn test_sequence_mismatch() {
        let mut codec = PacketCodec::new();
        let mut wire = BytesMut::from(&[1u8, 0, 0, 3, 0][..]);
        assert!(matches!(
            codec.decode(&mut wire),
            Err(CodecError::SequenceMismatch { expected: 0, actual: 3 })
        ));
    }

    #[test]
    fn test_reset_sequence() {
        let mut codec = PacketCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"a"), &mut wire).unwrap();
        codec.encode(Bytes::from_static(b"b"), &mut wire).unwrap();
        assert_eq!(codec.sequence(), 2);
        codec.reset_sequence();
        assert_eq!(codec.sequence(), 0);
    }

    #[test]
    fn test_partial_then_complete() {
        let mut codec = PacketCodec::new();
        let mut wire = BytesMut::from(&[3u8, 0, 0, 0, b'a'][..]);
        assert!(codec.decode(&mut wire).unwrap().is_none());
        assert!(codec.has_partial());
        wire.extend_from_slice(b"bc");
        let packet = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(&packet.payload[..], b"abc");
    }

    #[test]
    fn test_multiple_packets_in_buffer() {
        let mut wire = BytesMut::new();
        let mut writer = PacketCodec::new();
        writer.encode(Bytes::from_static(b"one"), &mut wire).unwrap();
        writer.encode(Bytes::from_static(b"two"), &mut wire).unwrap();

        let mut reader = PacketCodec::new();
        assert_eq!(&reader.decode(&mut wire).unwrap().unwrap().payload[..], b"one");
        assert_eq!(&reader.decode(&mut wire).unwrap().unwrap().payload[..], b"two");
        assert!(reader.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn test_large_payload_advances_sequence_per_fragment() {
        let payload = Bytes::from(vec![7u8; MAX_PAYLOAD_SIZE + 10]);
        let mut writer = PacketCodec::new();
        let mut wire = BytesMut::new();
        writer.encode(payload.clone(), &mut wire).unwrap();
        assert_eq!(writer.sequence(), 2);

        let mut reader = PacketCodec::new();
        let packet = reader.decode(&mut wire).unwrap().unwrap();
        assert_eq!(packet.payload, payload);
        assert_eq!(reader.sequence(), 2);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let mut writer = PacketCodec::new();
        writer.enable_compression();
        let mut reader = PacketCodec::new();
        reader.enable_compression();

        let sql = Bytes::from("SELECT name, email FROM users WHERE active = 1 ".repeat(10));
        let mut wire = BytesMut::new();
        writer.encode(sql.clone(), &mut wire).unwrap();
        let packet = reader.decode(&mut wire).unwrap().unwrap();
        assert_eq!(packet.payload, sql);
    }

    #[test]
    fn test_truncated_at_eof() {
        let mut codec = PacketCodec::new();
        let mut wire = BytesMut::from(&[5u8, 0, 0, 0, b'a'][..]);
        assert!(matches!(codec.decode_eof(&mut wire), Err(CodecError::Truncated(_))));
    }
}
