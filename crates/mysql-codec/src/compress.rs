//! zlib compression envelope (`CLIENT_COMPRESS`).
//!
//! Once compression is negotiated every write is wrapped in a 7-byte
//! envelope: compressed length, compressed sequence id and uncompressed
//! length. An uncompressed length of 0 means the payload is stored raw.
//! The envelope payload is a run of plain packets, which may span envelope
//! boundaries.

use std::io::{Read, Write};

use bytes::BytesMut;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use mysql_protocol::packet::{COMPRESSED_HEADER_SIZE, CompressedHeader, MAX_PAYLOAD_SIZE};

use crate::error::CodecError;
use crate::framer::{Packet, PacketFramer};

/// Payloads shorter than this are sent raw.
pub const MIN_COMPRESS_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy)]
enum State {
    Header { buf: [u8; COMPRESSED_HEADER_SIZE], filled: usize },
    Payload { header: CompressedHeader, remaining: usize },
}

impl State {
    const fn header() -> Self {
        Self::Header {
            buf: [0; COMPRESSED_HEADER_SIZE],
            filled: 0,
        }
    }
}

/// Push-driven reader of the compressed protocol.
///
/// Envelopes are validated against the compressed sequence counter,
/// inflated, and fed to an inner [`PacketFramer`].
#[derive(Debug)]
pub struct CompressedFramer {
    state: State,
    envelope: BytesMut,
    inner: PacketFramer,
    sequence: u8,
}

impl CompressedFramer {
    /// Create a compressed framer around a plain framer.
    #[must_use]
    pub fn new(inner: PacketFramer) -> Self {
        Self {
            state: State::header(),
            envelope: BytesMut::new(),
            inner,
            sequence: 0,
        }
    }

    /// Next expected (or next to send) compressed sequence id.
    #[must_use]
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Set the compressed sequence counter.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Whether an envelope or inner packet is partially received.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.inner.has_partial()
            || !self.envelope.is_empty()
            || matches!(self.state, State::Header { filled, .. } if filled > 0)
            || matches!(self.state, State::Payload { .. })
    }

    /// Push a chunk and collect every plain packet it completes.
    pub fn push(&mut self, mut data: &[u8]) -> Result<Vec<Packet>, CodecError> {
        let mut out = Vec::new();
        while !data.is_empty() {
            match &mut self.state {
                State::Header { buf, filled } => {
                    let take = (COMPRESSED_HEADER_SIZE - *filled).min(data.len());
                    buf[*filled..*filled + take].copy_from_slice(&data[..take]);
                    *filled += take;
                    data = &data[take..];
                    if *filled < COMPRESSED_HEADER_SIZE {
                        break;
                    }
                    let header = CompressedHeader::decode(&mut &buf[..])?;
                    if header.sequence != self.sequence {
                        return Err(CodecError::SequenceMismatch {
                            expected: self.sequence,
                            actual: header.sequence,
                        });
                    }
                    self.sequence = self.sequence.wrapping_add(1);
                    let remaining = header.compressed_length as usize;
                    self.envelope.reserve(remaining);
                    self.state = State::Payload { header, remaining };
                    if remaining == 0 {
                        self.finish_envelope(header, &mut out)?;
                    }
                }
                State::Payload { header, remaining } => {
                    let take = (*remaining).min(data.len());
                    self.envelope.extend_from_slice(&data[..take]);
                    data = &data[take..];
                    *remaining -= take;
                    if *remaining == 0 {
                        let header = *header;
                        self.finish_envelope(header, &mut out)?;
                    }
                }
            }
        }
        Ok(out)
    }

    fn finish_envelope(
        &mut self,
        header: CompressedHeader,
        out: &mut Vec<Packet>,
    ) -> Result<(), CodecError> {
        self.state = State::header();
        let raw = self.envelope.split().freeze();
        let plain = if header.is_raw() {
            raw
        } else {
            let expected = header.uncompressed_length as usize;
            let mut inflated = Vec::with_capacity(expected);
            // One byte past the announced length is enough to detect a lie.
            ZlibDecoder::new(&raw[..])
                .take(expected as u64 + 1)
                .read_to_end(&mut inflated)
                .map_err(|e| CodecError::Compression(e.to_string()))?;
            if inflated.len() > expected {
                return Err(CodecError::Compression(format!(
                    "envelope inflates past the announced {expected} bytes"
                )));
            }
            if inflated.len() != expected {
                return Err(CodecError::Compression(format!(
                    "inflated {} bytes, header announced {expected}",
                    inflated.len()
                )));
            }
            inflated.into()
        };
        tracing::trace!(
            sequence = header.sequence,
            compressed = header.compressed_length,
            uncompressed = plain.len(),
            "decoded compressed envelope"
        );
        out.extend(self.inner.push(&plain)?);
        Ok(())
    }

    /// Drop any partially received data.
    pub fn clear(&mut self) {
        self.state = State::header();
        self.envelope.clear();
        self.inner.clear();
    }
}

/// Wrap already-framed plain packet bytes into compressed envelopes.
///
/// Returns the next compressed sequence id.
pub fn write_compressed(
    dst: &mut BytesMut,
    plain: &[u8],
    mut sequence: u8,
) -> Result<u8, CodecError> {
    for chunk in plain.chunks(MAX_PAYLOAD_SIZE) {
        let deflated = if chunk.len() >= MIN_COMPRESS_LENGTH {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(chunk.len() / 2), Compression::default());
            encoder.write_all(chunk)?;
            Some(encoder.finish()?).filter(|d| d.len() < chunk.len())
        } else {
            None
        };
        match deflated {
            Some(deflated) => {
                CompressedHeader {
                    compressed_length: deflated.len() as u32,
                    sequence,
                    uncompressed_length: chunk.len() as u32,
                }
                .encode(dst);
                dst.extend_from_slice(&deflated);
            }
            None => {
                CompressedHeader {
                    compressed_length: chunk.len() as u32,
                    sequence,
                    uncompressed_length: 0,
                }
                .encode(dst);
                dst.extend_from_slice(chunk);
            }
        }
        sequence = sequence.wrapping_add(1);
    }
    Ok(sequence)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::framer::write_fragments;

    fn framer() -> CompressedFramer {
        CompressedFramer::new(PacketFramer::new(1 << 30))
    }

    #[test]
    fn test_short_payload_stored_raw() {
        let mut plain = BytesMut::new();
        write_fragments(&mut plain, b"\x0e", 0);
        let mut wire = BytesMut::new();
        assert_eq!(write_compressed(&mut wire, &plain, 0).unwrap(), 1);
        assert_eq!(&wire[..7], &[5, 0, 0, 0, 0, 0, 0]);

        let mut reader = framer();
        let packets = reader.push(&wire).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0].payload[..], b"\x0e");
        assert_eq!(reader.sequence(), 1);
    }

    #[test]
    fn test_compression_roundtrip() {
        let sql = "SELECT * FROM orders WHERE customer_id = 1 ".repeat(40);
        let mut plain = BytesMut::new();
        write_fragments(&mut plain, sql.as_bytes(), 0);
        let mut wire = BytesMut::new();
        write_compressed(&mut wire, &plain, 7).unwrap();

        let header = CompressedHeader::decode(&mut &wire[..]).unwrap();
        assert_eq!(header.sequence, 7);
        assert_eq!(header.uncompressed_length as usize, plain.len());
        assert!((header.compressed_length as usize) < plain.len());

        let mut reader = framer();
        reader.set_sequence(7);
        let mut packets = Vec::new();
        for chunk in wire.chunks(3) {
            packets.extend(reader.push(chunk).unwrap());
        }
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0].payload[..], sql.as_bytes());
        assert!(!reader.has_partial());
    }

    #[test]
    fn test_several_packets_in_one_envelope() {
        let mut plain = BytesMut::new();
        let mut seq = 1;
        for row in ["first row", "second row", "third row"] {
            seq = write_fragments(&mut plain, row.as_bytes(), seq);
        }
        let mut wire = BytesMut::new();
        write_compressed(&mut wire, &plain, 0).unwrap();
        let packets = framer().push(&wire).unwrap();
        let payloads: Vec<_> = packets.iter().map(|p| &p.payload[..]).collect();
        assert_eq!(payloads, vec![&b"first row"[..], b"second row", b"third row"]);
    }

    #[test]
    fn test_compressed_sequence_mismatch() {
        let mut plain = BytesMut::new();
        write_fragments(&mut plain, b"x", 0);
        let mut wire = BytesMut::new();
        write_compressed(&mut wire, &plain, 4).unwrap();
        assert!(matches!(
            framer().push(&wire),
            Err(CodecError::SequenceMismatch { expected: 0, actual: 4 })
        ));
    }

    #[test]
    fn test_inflation_bounded_by_header() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; 1 << 20]).unwrap();
        let deflated = encoder.finish().unwrap();

        let mut wire = BytesMut::new();
        CompressedHeader {
            compressed_length: deflated.len() as u32,
            sequence: 0,
            uncompressed_length: 10,
        }
        .encode(&mut wire);
        wire.extend_from_slice(&deflated);

        let mut reader = framer();
        match reader.push(&wire) {
            Err(CodecError::Compression(msg)) => assert!(msg.contains("announced 10")),
            other => panic!("expected compression error, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_deflate_stream() {
        let mut wire = BytesMut::new();
        CompressedHeader {
            compressed_length: 4,
            sequence: 0,
            uncompressed_length: 100,
        }
        .encode(&mut wire);
        wire.extend_from_slice(&[1, 2, 3, 4]);
        assert!(matches!(framer().push(&wire), Err(CodecError::Compression(_))));
    }
}
