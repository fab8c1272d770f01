//! Codec utilities for MySQL protocol encoding and decoding.
//!
//! Stateless primitives over [`bytes::Buf`] and [`bytes::BufMut`] cursors:
//! fixed-width little-endian integers, length-encoded integers and strings,
//! and null-terminated strings. Every reader checks the remaining length
//! before touching the buffer, so a short read is an error, never a panic.

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

/// Marker byte for SQL NULL inside a text-protocol row.
pub const NULL_MARKER: u8 = 0xFB;

/// Marker for a 2-byte length-encoded integer.
pub const LENENC_2: u8 = 0xFC;

/// Marker for a 3-byte length-encoded integer.
pub const LENENC_3: u8 = 0xFD;

/// Marker for an 8-byte length-encoded integer.
pub const LENENC_8: u8 = 0xFE;

#[inline]
fn ensure(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        Err(ProtocolError::UnexpectedEof)
    } else {
        Ok(())
    }
}

/// Read a 1-byte unsigned integer.
pub fn read_u8(src: &mut impl Buf) -> Result<u8, ProtocolError> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

/// Read a 2-byte little-endian unsigned integer.
pub fn read_u16(src: &mut impl Buf) -> Result<u16, ProtocolError> {
    ensure(src, 2)?;
    Ok(src.get_u16_le())
}

/// Read a 3-byte little-endian unsigned integer.
pub fn read_u24(src: &mut impl Buf) -> Result<u32, ProtocolError> {
    ensure(src, 3)?;
    Ok(src.get_uint_le(3) as u32)
}

/// Read a 4-byte little-endian unsigned integer.
pub fn read_u32(src: &mut impl Buf) -> Result<u32, ProtocolError> {
    ensure(src, 4)?;
    Ok(src.get_u32_le())
}

/// Read an 8-byte little-endian unsigned integer.
pub fn read_u64(src: &mut impl Buf) -> Result<u64, ProtocolError> {
    ensure(src, 8)?;
    Ok(src.get_u64_le())
}

/// Read a 1-byte signed integer.
pub fn read_i8(src: &mut impl Buf) -> Result<i8, ProtocolError> {
    ensure(src, 1)?;
    Ok(src.get_i8())
}

/// Read a 2-byte little-endian signed integer.
pub fn read_i16(src: &mut impl Buf) -> Result<i16, ProtocolError> {
    ensure(src, 2)?;
    Ok(src.get_i16_le())
}

/// Read a 3-byte little-endian signed integer, sign-extended to 32 bits.
pub fn read_i24(src: &mut impl Buf) -> Result<i32, ProtocolError> {
    let raw = read_u24(src)?;
    Ok(((raw << 8) as i32) >> 8)
}

/// Read a 4-byte little-endian signed integer.
pub fn read_i32(src: &mut impl Buf) -> Result<i32, ProtocolError> {
    ensure(src, 4)?;
    Ok(src.get_i32_le())
}

/// Read an 8-byte little-endian signed integer.
pub fn read_i64(src: &mut impl Buf) -> Result<i64, ProtocolError> {
    ensure(src, 8)?;
    Ok(src.get_i64_le())
}

/// Write a 3-byte little-endian unsigned integer.
///
/// Only the low 24 bits of `value` are written.
pub fn write_u24(dst: &mut impl BufMut, value: u32) {
    dst.put_uint_le(u64::from(value & 0x00FF_FFFF), 3);
}

/// Read a length-encoded integer.
///
/// `0xFB` (the text-row NULL marker) and `0xFF` (the ERR header) are not
/// valid here and fail with [`ProtocolError::InvalidLengthEncoding`].
pub fn read_lenenc_int(src: &mut impl Buf) -> Result<u64, ProtocolError> {
    let first = read_u8(src)?;
    match first {
        0x00..=0xFA => Ok(u64::from(first)),
        LENENC_2 => read_u16(src).map(u64::from),
        LENENC_3 => read_u24(src).map(u64::from),
        LENENC_8 => read_u64(src),
        other => Err(ProtocolError::InvalidLengthEncoding(other)),
    }
}

/// Number of bytes [`write_lenenc_int`] uses for `value`.
#[must_use]
pub const fn lenenc_int_len(value: u64) -> usize {
    if value < 0xFB {
        1
    } else if value <= 0xFFFF {
        3
    } else if value <= 0x00FF_FFFF {
        4
    } else {
        9
    }
}

/// Write a length-encoded integer in its shortest form.
pub fn write_lenenc_int(dst: &mut impl BufMut, value: u64) {
    if value < 0xFB {
        dst.put_u8(value as u8);
    } else if value <= 0xFFFF {
        dst.put_u8(LENENC_2);
        dst.put_u16_le(value as u16);
    } else if value <= 0x00FF_FFFF {
        dst.put_u8(LENENC_3);
        write_u24(dst, value as u32);
    } else {
        dst.put_u8(LENENC_8);
        dst.put_u64_le(value);
    }
}

/// Read exactly `len` bytes.
///
/// When `src` is [`Bytes`] this is zero-copy.
pub fn read_fixed(src: &mut impl Buf, len: usize) -> Result<Bytes, ProtocolError> {
    ensure(src, len)?;
    Ok(src.copy_to_bytes(len))
}

/// Read a length-encoded byte string.
pub fn read_lenenc_bytes(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    let len = read_lenenc_int(src)?;
    let len = usize::try_from(len).map_err(|_| ProtocolError::UnexpectedEof)?;
    read_fixed(src, len)
}

/// Read a length-encoded byte string, or `None` for the NULL marker.
///
/// Used for text-protocol row values, where `0xFB` stands for SQL NULL.
pub fn read_lenenc_bytes_or_null(src: &mut impl Buf) -> Result<Option<Bytes>, ProtocolError> {
    ensure(src, 1)?;
    if src.chunk()[0] == NULL_MARKER {
        src.advance(1);
        return Ok(None);
    }
    read_lenenc_bytes(src).map(Some)
}

/// Read a length-encoded UTF-8 string.
pub fn read_lenenc_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let bytes = read_lenenc_bytes(src)?;
    bytes_to_string(&bytes)
}

/// Write a length-encoded byte string.
pub fn write_lenenc_bytes(dst: &mut impl BufMut, data: &[u8]) {
    write_lenenc_int(dst, data.len() as u64);
    dst.put_slice(data);
}

/// Write a length-encoded UTF-8 string.
pub fn write_lenenc_str(dst: &mut impl BufMut, s: &str) {
    write_lenenc_bytes(dst, s.as_bytes());
}

/// Read a null-terminated byte string. The terminator is consumed.
pub fn read_null_terminated_bytes(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    let chunk = src.chunk();
    // Buf implementations used here are contiguous, so the chunk is the
    // whole remaining buffer.
    let pos = chunk
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::MissingNullTerminator)?;
    let out = src.copy_to_bytes(pos);
    src.advance(1);
    Ok(out)
}

/// Read a null-terminated UTF-8 string.
pub fn read_null_terminated_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let bytes = read_null_terminated_bytes(src)?;
    bytes_to_string(&bytes)
}

/// Write a null-terminated string.
pub fn write_null_terminated(dst: &mut impl BufMut, data: &[u8]) {
    dst.put_slice(data);
    dst.put_u8(0);
}

/// Read everything left in the buffer as a UTF-8 string.
pub fn read_eof_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let len = src.remaining();
    let bytes = src.copy_to_bytes(len);
    bytes_to_string(&bytes)
}

fn bytes_to_string(bytes: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8("string field"))
}
