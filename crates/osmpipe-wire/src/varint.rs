//! LEB128 varints and the zigzag mapping — the two scalar encodings
//! everything in OSMPBF is built from.
//!
//! Field keys, length prefixes, string-table indices and every packed
//! delta stream (dense node ids, coordinates, way refs, member ids)
//! arrive as varints. The signed kinds are zigzag-mapped first so that
//! small negative deltas, which dominate coordinate streams, stay as
//! short on the wire as small positive ones.

use crate::error::WireError;

/// Decode one unsigned LEB128 varint from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied, leaving any
/// trailing bytes untouched — packed readers call this in a loop and
/// advance by the returned count. Each byte contributes seven payload
/// bits; the high bit announces a following byte, so a `u64` never
/// spans more than ten bytes.
///
/// # Errors
///
/// - [`WireError::VarintTooLong`] when a tenth byte still carries the
///   continuation bit.
/// - [`WireError::UnexpectedEof`] when `buf` ends mid-value.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), WireError> {
    let mut acc: u64 = 0;
    let mut used: usize = 0;

    for &byte in buf {
        if used == 10 {
            return Err(WireError::VarintTooLong);
        }
        acc |= u64::from(byte & 0x7F) << (7 * used);
        used += 1;
        if byte & 0x80 == 0 {
            return Ok((acc, used));
        }
    }

    Err(WireError::UnexpectedEof { offset: buf.len() })
}

/// Append `value` to `out` as an unsigned LEB128 varint.
pub fn encode_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Map a zigzag-encoded unsigned value back to signed.
///
/// sint32/sint64 fields interleave the signs — 0, -1, 1, -2, ...
/// encode as 0, 1, 2, 3, ... — so a delta of minus one costs one byte
/// instead of ten.
#[inline]
pub fn decode_zigzag(raw: u64) -> i64 {
    ((raw >> 1) ^ (raw & 1).wrapping_neg()) as i64
}

/// Inverse of [`decode_zigzag`].
#[inline]
pub fn encode_zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}
