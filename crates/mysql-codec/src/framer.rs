//! Resumable packet framer.
//!
//! [`PacketFramer`] is a push parser: feed it byte chunks of any size and it
//! yields complete logical packets. Fragments of exactly
//! [`MAX_PAYLOAD_SIZE`] bytes are joined with the fragment that follows
//! them; a shorter fragment (possibly empty) ends the logical packet.

use bytes::{Bytes, BytesMut};
use mysql_protocol::packet::{MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE, PacketHeader};

use crate::error::CodecError;

/// A complete logical packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence id of the first fragment.
    pub sequence: u8,
    /// Sequence id of the last fragment. Equal to `sequence` unless the
    /// payload spanned several fragments.
    pub last_sequence: u8,
    /// Reassembled payload.
    pub payload: Bytes,
}

impl Packet {
    /// Create a single-fragment packet.
    #[must_use]
    pub fn new(sequence: u8, payload: Bytes) -> Self {
        Self {
            sequence,
            last_sequence: sequence,
            payload,
        }
    }

    /// Number of wire fragments this payload occupies.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        fragment_count(self.payload.len())
    }
}

/// Number of wire fragments a payload of `len` bytes is split into.
///
/// A payload that is an exact multiple of [`MAX_PAYLOAD_SIZE`] needs a
/// trailing empty fragment.
#[must_use]
pub const fn fragment_count(len: usize) -> usize {
    len / MAX_PAYLOAD_SIZE + 1
}

#[derive(Debug, Clone, Copy)]
enum State {
    Header { buf: [u8; PACKET_HEADER_SIZE], filled: usize },
    Payload { remaining: usize, continued: bool },
}

impl State {
    const fn header() -> Self {
        Self::Header {
            buf: [0; PACKET_HEADER_SIZE],
            filled: 0,
        }
    }
}

/// Push-driven packet reassembler.
#[derive(Debug)]
pub struct PacketFramer {
    state: State,
    partial: BytesMut,
    first_sequence: u8,
    last_sequence: u8,
    in_progress: bool,
    max_packet_size: usize,
}

impl PacketFramer {
    /// Create a framer that accepts logical packets up to `max_packet_size`.
    #[must_use]
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            state: State::header(),
            partial: BytesMut::new(),
            first_sequence: 0,
            last_sequence: 0,
            in_progress: false,
            max_packet_size,
        }
    }

    /// Maximum accepted logical packet size.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Push a chunk and collect every packet it completes.
    pub fn push(&mut self, mut data: &[u8]) -> Result<Vec<Packet>, CodecError> {
        let mut out = Vec::new();
        while !data.is_empty() {
            let (consumed, packet) = self.feed(data)?;
            data = &data[consumed..];
            out.extend(packet);
        }
        Ok(out)
    }

    /// Consume bytes until one packet completes or `data` runs out.
    ///
    /// Returns how many bytes were consumed. Bytes after a completed packet
    /// are left for the caller, which lets the codec switch framing modes
    /// on an exact packet boundary.
    pub fn feed(&mut self, data: &[u8]) -> Result<(usize, Option<Packet>), CodecError> {
        let mut consumed = 0;
        loop {
            match &mut self.state {
                State::Header { buf, filled } => {
                    if consumed == data.len() {
                        return Ok((consumed, None));
                    }
                    let take = (PACKET_HEADER_SIZE - *filled).min(data.len() - consumed);
                    buf[*filled..*filled + take].copy_from_slice(&data[consumed..consumed + take]);
                    *filled += take;
                    consumed += take;
                    if *filled < PACKET_HEADER_SIZE {
                        return Ok((consumed, None));
                    }
                    let header = PacketHeader::decode(&mut &buf[..])?;
                    self.start_fragment(header)?;
                }
                State::Payload { remaining, continued } => {
                    let take = (*remaining).min(data.len() - consumed);
                    self.partial.extend_from_slice(&data[consumed..consumed + take]);
                    consumed += take;
                    *remaining -= take;
                    if *remaining > 0 {
                        return Ok((consumed, None));
                    }
                    let continued = *continued;
                    self.state = State::header();
                    if !continued {
                        self.in_progress = false;
                        let packet = Packet {
                            sequence: self.first_sequence,
                            last_sequence: self.last_sequence,
                            payload: self.partial.split().freeze(),
                        };
                        return Ok((consumed, Some(packet)));
                    }
                }
            }
        }
    }

    fn start_fragment(&mut self, header: PacketHeader) -> Result<(), CodecError> {
        if self.in_progress {
            let expected = self.last_sequence.wrapping_add(1);
            if header.sequence != expected {
                return Err(CodecError::SequenceMismatch {
                    expected,
                    actual: header.sequence,
                });
            }
        } else {
            self.first_sequence = header.sequence;
            self.in_progress = true;
        }
        self.last_sequence = header.sequence;

        let length = header.length as usize;
        let total = self.partial.len() + length;
        if total > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total,
                max: self.max_packet_size,
            });
        }
        self.partial.reserve(length);
        self.state = State::Payload {
            remaining: length,
            continued: header.is_continued(),
        };
        Ok(())
    }

    /// Whether a packet is partially received.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.in_progress || matches!(self.state, State::Header { filled, .. } if filled > 0)
    }

    /// Bytes of the unfinished packet buffered so far.
    #[must_use]
    pub fn partial_len(&self) -> usize {
        match self.state {
            State::Header { filled, .. } => self.partial.len() + filled,
            State::Payload { .. } => self.partial.len(),
        }
    }

    /// Drop any partially received packet.
    pub fn clear(&mut self) {
        self.state = State::header();
        self.partial.clear();
        self.in_progress = false;
    }
}

/// Write `payload` as one or more wire fragments starting at `sequence`.
///
/// Returns the sequence id to use for the next packet.
pub fn write_fragments(dst: &mut BytesMut, payload: &[u8], mut sequence: u8) -> u8 {
    dst.reserve(payload.len() + fragment_count(payload.len()) * PACKET_HEADER_SIZE);
    let mut chunks = payload.chunks(MAX_PAYLOAD_SIZE);
    let mut last_len = 0;
    for chunk in chunks.by_ref() {
        PacketHeader::new(chunk.len() as u32, sequence).encode(dst);
        dst.extend_from_slice(chunk);
        sequence = sequence.wrapping_add(1);
        last_len = chunk.len();
    }
    // Empty payloads, and payloads that end on a full fragment, need a
    // terminating short fragment.
    if payload.is_empty() || last_len == MAX_PAYLOAD_SIZE {
        PacketHeader::new(0, sequence).encode(dst);
        sequence = sequence.wrapping_add(1);
    }
    sequence
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(payload: &[u8], sequence: u8) -> BytesMut {
        let mut buf = BytesMut::new();
        write_fragments(&mut buf, payload, sequence);
        buf
    }

    #[test]
    fn test_single_packet() {
        let mut framer = PacketFramer::new(1 << 30);
        let packets = framer.push(&[0x03, 0x00, 0x00, 0x05, b'a', b'b', b'c']).unwrap();
        assert_eq!(packets, vec![Packet::new(5, Bytes::from_static(b"abc"))]);
        assert!(!framer.has_partial());
    }

    #[test]
    fn test_empty_packet() {
        let mut framer = PacketFramer::new(1 << 30);
        let packets = framer.push(&[0, 0, 0, 2]).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].payload.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = frame(b"hello world", 0);
        let mut framer = PacketFramer::new(1 << 30);
        let mut packets = Vec::new();
        for byte in wire.iter() {
            packets.extend(framer.push(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0].payload[..], b"hello world");
    }

    #[test]
    fn test_feed_stops_at_packet_boundary() {
        let mut wire = frame(b"one", 0);
        wire.extend_from_slice(&frame(b"two", 1));
        let mut framer = PacketFramer::new(1 << 30);
        let (consumed, packet) = framer.feed(&wire).unwrap();
        assert_eq!(consumed, 7);
        assert_eq!(&packet.unwrap().payload[..], b"one");
        let (consumed, packet) = framer.feed(&wire[7..]).unwrap();
        assert_eq!(consumed, 7);
        assert_eq!(&packet.unwrap().payload[..], b"two");
    }

    #[test]
    fn test_large_payload_exact_multiple() {
        let payload = vec![0xAB; MAX_PAYLOAD_SIZE];
        let wire = frame(&payload, 3);
        // Full fragment + empty terminator.
        assert_eq!(wire.len(), MAX_PAYLOAD_SIZE + 2 * PACKET_HEADER_SIZE);

        let mut framer = PacketFramer::new(1 << 30);
        let packets = framer.push(&wire).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload.len(), MAX_PAYLOAD_SIZE);
        assert_eq!(packets[0].sequence, 3);
        assert_eq!(packets[0].last_sequence, 4);
    }

    #[test]
    fn test_large_payload_in_chunks() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD_SIZE + 1000).map(|i| i as u8).collect();
        let wire = frame(&payload, 0);
        let mut framer = PacketFramer::new(1 << 30);
        let mut packets = Vec::new();
        for chunk in wire.chunks(65_537) {
            packets.extend(framer.push(chunk).unwrap());
        }
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload.len(), payload.len());
        assert_eq!(&packets[0].payload[..], &payload[..]);
        assert_eq!(packets[0].last_sequence, 1);
    }

    #[test]
    fn test_fragment_sequence_gap_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE];
        let mut wire = BytesMut::new();
        PacketHeader::new(MAX_PAYLOAD_SIZE as u32, 0).encode(&mut wire);
        wire.extend_from_slice(&payload);
        PacketHeader::new(0, 5).encode(&mut wire);
        let mut framer = PacketFramer::new(1 << 30);
        assert!(matches!(
            framer.push(&wire),
            Err(CodecError::SequenceMismatch { expected: 1, actual: 5 })
        ));
    }

    #[test]
    fn test_max_packet_size_enforced() {
        let wire = frame(&[0u8; 100], 0);
        let mut framer = PacketFramer::new(64);
        assert!(matches!(
            framer.push(&wire),
            Err(CodecError::PacketTooLarge { size: 100, max: 64 })
        ));
    }

    #[test]
    fn test_partial_tracking() {
        let wire = frame(b"abcdef", 0);
        let mut framer = PacketFramer::new(1 << 30);
        assert!(framer.push(&wire[..6]).unwrap().is_empty());
        assert!(framer.has_partial());
        assert_eq!(framer.partial_len(), 2);
        framer.clear();
        assert!(!framer.has_partial());
    }

    #[test]
    fn test_write_fragments_sequence() {
        let mut buf = BytesMut::new();
        assert_eq!(write_fragments(&mut buf, b"x", 255), 0);
        assert_eq!(&buf[..], &[1, 0, 0, 255, b'x']);
    }

    proptest! {
        #[test]
        fn prop_reassembles_under_any_chunking(
            payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..600), 1..6),
            chunk in 1usize..97,
        ) {
            let mut wire = BytesMut::new();
            let mut seq = 0u8;
            for p in &payloads {
                seq = write_fragments(&mut wire, p, seq);
            }
            let mut framer = PacketFramer::new(1 << 20);
            let mut out = Vec::new();
            for piece in wire.chunks(chunk) {
                out.extend(framer.push(piece).unwrap());
            }
            prop_assert_eq!(out.len(), payloads.len());
            for (packet, expected) in out.iter().zip(&payloads) {
                prop_assert_eq!(&packet.payload[..], &expected[..]);
            }
            prop_assert!(!framer.has_partial());
        }
    }
}
