//! Base-128 variable-length integers and zig-zag mapping.
//!
//! Each byte carries seven value bits, least-significant group first, with the high bit set on
//! every byte except the last. A `u64` therefore takes between 1 and [`MAX_VARINT_LEN`] bytes.

use crate::{EncoderError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum number of bytes a 64-bit varint may occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` to `writer` as a varint.
#[inline]
pub fn encode_varint(mut value: u64, writer: &mut BytesMut) {
    while value >= 0x80 {
        writer.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    writer.put_u8(value as u8);
}

/// Reads one varint from `reader`.
///
/// # Errors
/// - `TruncatedInput` if the buffer ends before the terminating byte.
/// - `MalformedWireData` if no terminating byte is found within [`MAX_VARINT_LEN`] bytes, or
///   the tenth byte carries bits beyond the 64-bit domain.
#[inline]
pub fn decode_varint(reader: &mut Bytes) -> Result<u64> {
    let mut value = 0u64;
    for index in 0..MAX_VARINT_LEN {
        if !reader.has_remaining() {
            return Err(EncoderError::TruncatedInput {
                needed: 1,
                remaining: 0,
            });
        }
        let byte = reader.get_u8();
        if index == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(EncoderError::MalformedWireData(format!(
                "varint exceeds {} bytes or overflows 64 bits",
                MAX_VARINT_LEN
            )));
        }
        value |= u64::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    // Unreachable: the tenth byte either terminates or is rejected above.
    Err(EncoderError::MalformedWireData(format!(
        "varint exceeds {} bytes",
        MAX_VARINT_LEN
    )))
}

/// Number of bytes [`encode_varint`] writes for `value`.
#[inline]
pub fn encoded_len(value: u64) -> usize {
    // Bits needed, rounded up to 7-bit groups; zero still takes one byte.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Maps a signed integer onto an unsigned one so that small magnitudes stay short:
/// `0 → 0, -1 → 1, 1 → 2, -2 → 3, ...`
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Exact inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// 32-bit zig-zag, as used by `sint32` fields.
#[inline]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Exact inverse of [`zigzag_encode32`].
#[inline]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_varint(value, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(bytes_of(0), vec![0x00]);
        assert_eq!(bytes_of(1), vec![0x01]);
        assert_eq!(bytes_of(127), vec![0x7F]);
        assert_eq!(bytes_of(128), vec![0x80, 0x01]);
        assert_eq!(bytes_of(300), vec![0xAC, 0x02]);
        assert_eq!(bytes_of(u64::MAX).len(), MAX_VARINT_LEN);
        assert_eq!(*bytes_of(u64::MAX).last().unwrap(), 0x01);
    }

    #[test]
    fn test_encoded_len_matches_writer() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(encoded_len(value), bytes_of(value).len(), "value {}", value);
        }
    }

    #[test]
    fn test_decode_rejects_overflowing_tenth_byte() {
        let mut data = vec![0xFF; 9];
        data.push(0x02);
        let mut reader = Bytes::from(data);
        assert!(matches!(
            decode_varint(&mut reader),
            Err(EncoderError::MalformedWireData(_))
        ));
    }

    #[test]
    fn test_zigzag32_vectors() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        assert_eq!(zigzag_decode32(u32::MAX), i32::MIN);
    }
}
