//! Tag framing and the writer/reader cursors.
//!
//! A field on the wire is `varint((field_number << 3) | wire_type)` followed by a payload whose
//! shape the wire type alone determines, which is what lets a reader skip fields it does not
//! know.

use crate::varint::{decode_varint, encode_varint};
use crate::{Decoder, Encoder, EncoderError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// How the payload following a tag is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Parses the low three bits of a tag.
    ///
    /// # Errors
    /// Returns `MalformedWireData` for the deprecated group types (3, 4) and the unassigned
    /// values 6 and 7.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            3 | 4 => Err(EncoderError::MalformedWireData(format!(
                "group wire type {} is not supported",
                bits
            ))),
            other => Err(EncoderError::MalformedWireData(format!(
                "invalid wire type {}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireType::Varint => "VARINT",
            WireType::Fixed64 => "FIXED64",
            WireType::LengthDelimited => "LENGTH_DELIMITED",
            WireType::Fixed32 => "FIXED32",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field number paired with the wire type of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireTag {
    pub field_number: u32,
    pub wire_type: WireType,
}

impl WireTag {
    /// Largest field number protobuf allows (`2^29 - 1`).
    pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

    pub fn new(field_number: u32, wire_type: WireType) -> Self {
        Self {
            field_number,
            wire_type,
        }
    }

    /// The packed `(field_number << 3) | wire_type` value written as a varint.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.field_number) << 3) | self.wire_type as u64
    }

    /// Unpacks a raw tag value.
    ///
    /// # Errors
    /// Returns `MalformedWireData` if the wire type is invalid or the field number is zero or
    /// above [`WireTag::MAX_FIELD_NUMBER`].
    pub fn from_raw(raw: u64) -> Result<Self> {
        let wire_type = WireType::from_bits((raw & 0x07) as u8)?;
        let number = raw >> 3;
        if number == 0 || number > u64::from(Self::MAX_FIELD_NUMBER) {
            return Err(EncoderError::MalformedWireData(format!(
                "invalid field number {}",
                number
            )));
        }
        Ok(Self::new(number as u32, wire_type))
    }
}

/// Output cursor for one encode call.
///
/// Nested length-delimited payloads are written through [`WireWriter::write_nested`], which
/// encodes into a scratch writer first so the length prefix is always exact.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) {
        encode_varint(WireTag::new(field_number, wire_type).to_raw(), &mut self.buf);
    }

    pub fn write_varint(&mut self, value: u64) {
        encode_varint(value, &mut self.buf);
    }

    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Writes a varint length prefix followed by `bytes`.
    pub fn write_length_delimited(&mut self, bytes: &[u8]) {
        encode_varint(bytes.len() as u64, &mut self.buf);
        self.buf.put_slice(bytes);
    }

    /// Writes the payload of a scalar through its [`Encoder`] implementation.
    pub fn write_scalar<T: Encoder + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.encode(&mut self.buf)
    }

    /// Runs `body` against a scratch writer, then emits its output as one length-delimited
    /// payload.
    pub fn write_nested<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut WireWriter) -> Result<()>,
    {
        let mut scratch = WireWriter::new();
        body(&mut scratch)?;
        self.write_length_delimited(&scratch.buf);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Input cursor for one decode call.
///
/// Length-delimited payloads are split off the underlying [`Bytes`] without copying.
#[derive(Debug, Clone, Default)]
pub struct WireReader {
    buf: Bytes,
}

impl WireReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Reads the next tag, or `None` at end of input.
    pub fn read_tag(&mut self) -> Result<Option<WireTag>> {
        if self.is_empty() {
            return Ok(None);
        }
        let raw = decode_varint(&mut self.buf)?;
        WireTag::from_raw(raw).map(Some)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        decode_varint(&mut self.buf)
    }

    pub fn read_fixed32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_fixed64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Reads a varint length and splits off exactly that many bytes.
    pub fn read_length_delimited(&mut self) -> Result<Bytes> {
        let len = self.read_length()?;
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// A reader over the next length-delimited payload.
    pub fn read_nested(&mut self) -> Result<WireReader> {
        self.read_length_delimited().map(WireReader::new)
    }

    /// Reads the payload of a scalar through its [`Decoder`] implementation.
    pub fn read_scalar<T: Decoder>(&mut self) -> Result<T> {
        T::decode(&mut self.buf)
    }

    /// Consumes and discards one payload of the given wire type.
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                decode_varint(&mut self.buf)?;
            }
            WireType::Fixed64 => {
                self.ensure(8)?;
                self.buf.advance(8);
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.ensure(len)?;
                self.buf.advance(len);
            }
            WireType::Fixed32 => {
                self.ensure(4)?;
                self.buf.advance(4);
            }
        }
        Ok(())
    }

    /// Consumes one payload like [`WireReader::skip_field`] and returns the exact bytes it
    /// spanned, length prefix included.
    pub fn read_field_span(&mut self, wire_type: WireType) -> Result<Bytes> {
        let start = self.buf.clone();
        self.skip_field(wire_type)?;
        let consumed = start.len() - self.buf.len();
        Ok(start.slice(..consumed))
    }

    fn read_length(&mut self) -> Result<usize> {
        let len = decode_varint(&mut self.buf)?;
        usize::try_from(len).map_err(|_| {
            EncoderError::MalformedWireData(format!("length {} does not fit in memory", len))
        })
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(EncoderError::TruncatedInput { needed, remaining });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_packing() {
        let tag = WireTag::new(1, WireType::Varint);
        assert_eq!(tag.to_raw(), 0x08);
        let tag = WireTag::new(2, WireType::LengthDelimited);
        assert_eq!(tag.to_raw(), 0x12);
        assert_eq!(WireTag::from_raw(0x12).unwrap(), tag);
    }

    #[test]
    fn test_from_raw_rejects_field_zero() {
        assert!(matches!(
            WireTag::from_raw(0x00),
            Err(EncoderError::MalformedWireData(_))
        ));
    }

    #[test]
    fn test_nested_length_is_exact() {
        let mut writer = WireWriter::new();
        writer
            .write_nested(|w| {
                w.write_tag(1, WireType::Varint);
                w.write_varint(150);
                Ok(())
            })
            .unwrap();
        assert_eq!(writer.as_slice(), &[0x03, 0x08, 0x96, 0x01]);
    }

    #[test]
    fn test_read_field_span_includes_prefix() {
        let mut reader = WireReader::from_slice(&[0x02, 0xAA, 0xBB, 0x01]);
        let span = reader.read_field_span(WireType::LengthDelimited).unwrap();
        assert_eq!(&span[..], &[0x02, 0xAA, 0xBB]);
        assert_eq!(reader.remaining(), 1);
    }
}
