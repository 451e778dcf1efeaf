use crate::varint::{
    decode_varint, encode_varint, zigzag_decode, zigzag_decode32, zigzag_encode, zigzag_encode32,
};
use crate::*;
use bytes::{Buf, BufMut};

// --- Common helpers ---
/// Fails with `TruncatedInput` unless `reader` holds at least `needed` bytes.
#[inline]
pub(crate) fn ensure_remaining(reader: &Bytes, needed: usize) -> Result<()> {
    let remaining = reader.remaining();
    if remaining < needed {
        return Err(EncoderError::TruncatedInput { needed, remaining });
    }
    Ok(())
}

/// Reads a varint length prefix and splits off that many bytes.
///
/// # Errors
/// Returns `TruncatedInput` if fewer bytes remain than the prefix declares.
#[inline]
pub(crate) fn read_length_prefixed(reader: &mut Bytes) -> Result<Bytes> {
    let len = decode_varint(reader)?;
    let len = usize::try_from(len).map_err(|_| {
        EncoderError::MalformedWireData(format!("length {} does not fit in memory", len))
    })?;
    ensure_remaining(reader, len)?;
    Ok(reader.split_to(len))
}

#[inline]
fn write_length_prefixed(bytes: &[u8], writer: &mut BytesMut) {
    encode_varint(bytes.len() as u64, writer);
    writer.put_slice(bytes);
}

/// Decodes a varint and narrows it to a type that rejects out-of-range values.
fn decode_narrow<T: TryFrom<i64>>(reader: &mut Bytes, name: &str) -> Result<T> {
    let raw = decode_varint(reader)? as i64;
    T::try_from(raw).map_err(|_| {
        EncoderError::MalformedWireData(format!("varint {} out of range for {}", raw, name))
    })
}

// --- bool ---
/// Encodes a `bool` as varint `0` or `1`.
impl Encoder for bool {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_u8(u8::from(*self));
        Ok(())
    }

    fn is_default(&self) -> bool {
        !(*self)
    }
}
/// Decodes a `bool` from a varint.
///
/// Any non-zero varint is `true`, so non-canonical producers are accepted.
impl Decoder for bool {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(decode_varint(reader)? != 0)
    }
}

// --- char ---
/// Encodes a `char` as the varint of its code point.
impl Encoder for char {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_varint(u64::from(u32::from(*self)), writer);
        Ok(())
    }

    fn is_default(&self) -> bool {
        *self == '\0'
    }
}
impl Decoder for char {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        let raw = decode_varint(reader)?;
        u32::try_from(raw)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| EncoderError::MalformedWireData(format!("invalid code point {}", raw)))
    }
}

// --- Signed integer types (two's-complement varint) ---
/// Encodes signed integers as the varint of their sign-extended 64-bit value.
///
/// - Non-negative values take as few bytes as their magnitude needs
/// - Negative values always take 10 bytes; use [`SInt32`]/[`SInt64`] for short negatives
macro_rules! impl_signed_varint {
    ($($ty:ty),*) => {
        $(
            impl Encoder for $ty {
                const WIRE_TYPE: WireType = WireType::Varint;

                fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                    encode_varint(*self as i64 as u64, writer);
                    Ok(())
                }

                fn is_default(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}
impl_signed_varint!(i8, i16, i32, i64);

/// `i8` and `i16` reject varints outside their range.
impl Decoder for i8 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        decode_narrow(reader, "i8")
    }
}
impl Decoder for i16 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        decode_narrow(reader, "i16")
    }
}
/// Truncates the 64-bit varint, as protobuf parsers do for `int32`.
impl Decoder for i32 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(decode_varint(reader)? as i32)
    }
}
impl Decoder for i64 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(decode_varint(reader)? as i64)
    }
}

// --- Unsigned integer types ---
macro_rules! impl_unsigned_varint {
    ($($ty:ty),*) => {
        $(
            impl Encoder for $ty {
                const WIRE_TYPE: WireType = WireType::Varint;

                fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                    encode_varint(u64::from(*self), writer);
                    Ok(())
                }

                fn is_default(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}
impl_unsigned_varint!(u8, u16, u32, u64);

impl Decoder for u8 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        let raw = decode_varint(reader)?;
        u8::try_from(raw).map_err(|_| {
            EncoderError::MalformedWireData(format!("varint {} out of range for u8", raw))
        })
    }
}
impl Decoder for u16 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        let raw = decode_varint(reader)?;
        u16::try_from(raw).map_err(|_| {
            EncoderError::MalformedWireData(format!("varint {} out of range for u16", raw))
        })
    }
}
/// Truncates the 64-bit varint, as protobuf parsers do for `uint32`.
impl Decoder for u32 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(decode_varint(reader)? as u32)
    }
}
impl Decoder for u64 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        decode_varint(reader)
    }
}

// --- f32/f64 ---
/// Encodes an `f32` as 4 bytes (little-endian IEEE 754), bit for bit.
impl Encoder for f32 {
    const WIRE_TYPE: WireType = WireType::Fixed32;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_u32_le(self.to_bits());
        Ok(())
    }

    /// Only positive zero is the default; `-0.0` is written.
    fn is_default(&self) -> bool {
        self.to_bits() == 0
    }
}
/// Decodes an `f32` from 4 bytes, preserving NaN payloads and signed zero.
impl Decoder for f32 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        ensure_remaining(reader, 4)?;
        Ok(f32::from_bits(reader.get_u32_le()))
    }
}
/// Encodes an `f64` as 8 bytes (little-endian IEEE 754), bit for bit.
impl Encoder for f64 {
    const WIRE_TYPE: WireType = WireType::Fixed64;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_u64_le(self.to_bits());
        Ok(())
    }

    fn is_default(&self) -> bool {
        self.to_bits() == 0
    }
}
impl Decoder for f64 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        ensure_remaining(reader, 8)?;
        Ok(f64::from_bits(reader.get_u64_le()))
    }
}

// --- Explicit protobuf scalar flavours ---
/// `sint32`: zig-zag varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SInt32(pub i32);
/// `sint64`: zig-zag varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SInt64(pub i64);
/// `fixed32`: little-endian 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fixed32(pub u32);
/// `fixed64`: little-endian 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fixed64(pub u64);
/// `sfixed32`: little-endian 4 bytes, two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SFixed32(pub i32);
/// `sfixed64`: little-endian 8 bytes, two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SFixed64(pub i64);

impl Encoder for SInt32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_varint(u64::from(zigzag_encode32(self.0)), writer);
        Ok(())
    }

    fn is_default(&self) -> bool {
        self.0 == 0
    }
}
impl Decoder for SInt32 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(SInt32(zigzag_decode32(decode_varint(reader)? as u32)))
    }
}
impl Encoder for SInt64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_varint(zigzag_encode(self.0), writer);
        Ok(())
    }

    fn is_default(&self) -> bool {
        self.0 == 0
    }
}
impl Decoder for SInt64 {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(SInt64(zigzag_decode(decode_varint(reader)?)))
    }
}

macro_rules! impl_fixed {
    ($name:ident, $wire:expr, $width:expr, $put:ident, $get:ident) => {
        impl Encoder for $name {
            const WIRE_TYPE: WireType = $wire;

            fn encode(&self, writer: &mut BytesMut) -> Result<()> {
                writer.$put(self.0);
                Ok(())
            }

            fn is_default(&self) -> bool {
                self.0 == 0
            }
        }
        impl Decoder for $name {
            fn decode(reader: &mut Bytes) -> Result<Self> {
                ensure_remaining(reader, $width)?;
                Ok($name(reader.$get()))
            }
        }
    };
}
impl_fixed!(Fixed32, WireType::Fixed32, 4, put_u32_le, get_u32_le);
impl_fixed!(Fixed64, WireType::Fixed64, 8, put_u64_le, get_u64_le);
impl_fixed!(SFixed32, WireType::Fixed32, 4, put_i32_le, get_i32_le);
impl_fixed!(SFixed64, WireType::Fixed64, 8, put_i64_le, get_i64_le);

// --- String ---
/// Encodes a string as a varint byte length followed by its UTF-8 bytes.
impl Encoder for str {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        write_length_prefixed(self.as_bytes(), writer);
        Ok(())
    }

    fn is_default(&self) -> bool {
        self.is_empty()
    }
}
impl Encoder for String {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.as_str().encode(writer)
    }

    fn is_default(&self) -> bool {
        self.is_empty()
    }
}
/// Decodes a `String`.
///
/// A Rust `String` must hold UTF-8, so invalid sequences are reported as
/// `MalformedWireData`. Decode as [`Bytes`] to receive the raw payload unvalidated.
impl Decoder for String {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        let bytes = read_length_prefixed(reader)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            EncoderError::MalformedWireData(format!("string field is not valid UTF-8: {}", e))
        })
    }
}

// --- Bytes ---
impl Encoder for Bytes {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        write_length_prefixed(self, writer);
        Ok(())
    }

    fn is_default(&self) -> bool {
        self.is_empty()
    }
}
/// Zero-copy: the result shares the reader's buffer.
impl Decoder for Bytes {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        read_length_prefixed(reader)
    }
}
impl Encoder for Vec<u8> {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        write_length_prefixed(self, writer);
        Ok(())
    }

    fn is_default(&self) -> bool {
        self.is_empty()
    }
}
impl Decoder for Vec<u8> {
    fn decode(reader: &mut Bytes) -> Result<Self> {
        Ok(read_length_prefixed(reader)?.to_vec())
    }
}

// --- Unit ---
/// `()` encodes to zero bytes.
///
/// As a message field it is always elided; as an element it is framed as an empty
/// length-delimited payload by [`ScalarSerializer`](crate::ScalarSerializer).
impl Encoder for () {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn encode(&self, _writer: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn is_default(&self) -> bool {
        true
    }
}
impl Decoder for () {
    fn decode(_reader: &mut Bytes) -> Result<Self> {
        Ok(())
    }
}

/// Implementation for references - delegates to the referenced value
impl<T: Encoder + ?Sized> Encoder for &T {
    const WIRE_TYPE: WireType = T::WIRE_TYPE;

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        (**self).encode(writer)
    }

    fn is_default(&self) -> bool {
        (**self).is_default()
    }
}
