//! Serializer strategy objects.
//!
//! A [`Serializer`] is bound to exactly one [`TypeRef`] and knows how to write and read values
//! of that type. Serializers are immutable once built and shared as [`SharedSerializer`];
//! the registry hands out the same instance for a type for the life of the process.

use crate::config::CodecConfig;
use crate::core::{Fixed32, Fixed64, SFixed32, SFixed64, SInt32, SInt64};
use crate::descriptor::{ScalarType, ShapeDescriptor, TypeIdentity, TypeRef};
use crate::registry::SerializerRegistry;
use crate::structural::{StructuralDecoder, StructuralEncoder};
use crate::value::{Message, Value};
use crate::wire::{WireReader, WireType, WireWriter};
use crate::{EncoderError, Result};
use std::fmt;
use std::sync::Arc;

/// A serializer shared between cache entries and concurrent callers.
pub type SharedSerializer = Arc<dyn Serializer>;

/// Field number of the discriminator inside a polymorphic envelope.
pub const DISCRIMINATOR_FIELD: u32 = 1;
/// Field number of the concrete payload inside a polymorphic envelope.
pub const PAYLOAD_FIELD: u32 = 2;

/// Per-call state threaded through one encode or decode: the registry used for nested lookups
/// and the current nesting depth.
pub struct Context<'a> {
    registry: &'a SerializerRegistry,
    depth: usize,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a SerializerRegistry) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn registry(&self) -> &'a SerializerRegistry {
        self.registry
    }

    pub fn config(&self) -> &'a CodecConfig {
        self.registry.config()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Resolves `ty`, treating absence as an error.
    pub fn require(&self, ty: &TypeRef) -> Result<SharedSerializer> {
        self.registry.require(ty)
    }

    /// Runs `body` one nesting level deeper.
    ///
    /// # Errors
    /// Returns `RecursionLimitExceeded` once the configured limit is reached.
    pub fn nested<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let limit = self.config().recursion_limit;
        if self.depth >= limit {
            return Err(EncoderError::RecursionLimitExceeded(limit));
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }
}

/// Encode/decode strategy for one type.
///
/// `encode`/`decode` handle the payload as it appears after a field tag, so length-delimited
/// kinds include their length prefix. `encode_root`/`decode_root` handle a value that is the
/// whole buffer; only messages and unit differ from the field form.
pub trait Serializer: Send + Sync + fmt::Debug {
    fn type_ref(&self) -> &TypeRef;

    /// The wire type a field holding this type is tagged with.
    fn wire_type(&self) -> WireType;

    fn encode(&self, value: &Value, writer: &mut WireWriter, cx: &mut Context<'_>) -> Result<()>;

    fn decode(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Value>;

    fn encode_root(
        &self,
        value: &Value,
        writer: &mut WireWriter,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        self.encode(value, writer, cx)
    }

    fn decode_root(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Value> {
        self.decode(reader, cx)
    }

    /// Decodes a repeated occurrence of a singular field into `existing`.
    ///
    /// The default replaces the value (last one wins); messages merge instead.
    fn merge(
        &self,
        existing: &mut Value,
        reader: &mut WireReader,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        *existing = self.decode(reader, cx)?;
        Ok(())
    }
}

fn mismatch(expected: impl fmt::Display, value: &Value) -> EncoderError {
    let actual = match value {
        Value::Message(message) => format!("message {}", message.type_ref()),
        other => other.kind_name().to_string(),
    };
    EncoderError::TypeMismatch {
        expected: expected.to_string(),
        actual,
    }
}

fn narrow<T: TryFrom<i32>>(value: i32, scalar: ScalarType) -> Result<T> {
    T::try_from(value)
        .map_err(|_| EncoderError::Encode(format!("{} out of range for {}", value, scalar)))
}

/// Built-in serializer for one [`ScalarType`].
#[derive(Debug)]
pub struct ScalarSerializer {
    scalar: ScalarType,
    type_ref: TypeRef,
}

impl ScalarSerializer {
    pub fn new(scalar: ScalarType) -> Self {
        Self {
            scalar,
            type_ref: scalar.type_ref(),
        }
    }

    pub fn scalar(&self) -> ScalarType {
        self.scalar
    }
}

impl Serializer for ScalarSerializer {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn wire_type(&self) -> WireType {
        self.scalar.wire_type()
    }

    fn encode(&self, value: &Value, writer: &mut WireWriter, _cx: &mut Context<'_>) -> Result<()> {
        match (self.scalar, value) {
            (ScalarType::Bool, Value::Bool(v)) => writer.write_scalar(v),
            (ScalarType::Char, Value::Char(v)) => writer.write_scalar(v),
            (ScalarType::Int8, Value::I32(v)) => {
                writer.write_scalar(&narrow::<i8>(*v, self.scalar)?)
            }
            (ScalarType::Int16, Value::I32(v)) => {
                writer.write_scalar(&narrow::<i16>(*v, self.scalar)?)
            }
            (ScalarType::Int32, Value::I32(v)) => writer.write_scalar(v),
            (ScalarType::Int64, Value::I64(v)) => writer.write_scalar(v),
            (ScalarType::UInt32, Value::U32(v)) => writer.write_scalar(v),
            (ScalarType::UInt64, Value::U64(v)) => writer.write_scalar(v),
            (ScalarType::SInt32, Value::I32(v)) => writer.write_scalar(&SInt32(*v)),
            (ScalarType::SInt64, Value::I64(v)) => writer.write_scalar(&SInt64(*v)),
            (ScalarType::Fixed32, Value::U32(v)) => writer.write_scalar(&Fixed32(*v)),
            (ScalarType::Fixed64, Value::U64(v)) => writer.write_scalar(&Fixed64(*v)),
            (ScalarType::SFixed32, Value::I32(v)) => writer.write_scalar(&SFixed32(*v)),
            (ScalarType::SFixed64, Value::I64(v)) => writer.write_scalar(&SFixed64(*v)),
            (ScalarType::Float, Value::F32(v)) => writer.write_scalar(v),
            (ScalarType::Double, Value::F64(v)) => writer.write_scalar(v),
            (ScalarType::String, Value::String(v)) => writer.write_scalar(v.as_str()),
            (ScalarType::Bytes, Value::Bytes(v)) => writer.write_scalar(v),
            // An empty length-delimited payload.
            (ScalarType::Unit, Value::Unit) => {
                writer.write_varint(0);
                Ok(())
            }
            (scalar, other) => Err(mismatch(scalar, other)),
        }
    }

    fn decode(&self, reader: &mut WireReader, _cx: &mut Context<'_>) -> Result<Value> {
        let value = match self.scalar {
            ScalarType::Bool => Value::Bool(reader.read_scalar()?),
            ScalarType::Char => Value::Char(reader.read_scalar()?),
            ScalarType::Int8 => Value::I32(i32::from(reader.read_scalar::<i8>()?)),
            ScalarType::Int16 => Value::I32(i32::from(reader.read_scalar::<i16>()?)),
            ScalarType::Int32 => Value::I32(reader.read_scalar()?),
            ScalarType::Int64 => Value::I64(reader.read_scalar()?),
            ScalarType::UInt32 => Value::U32(reader.read_scalar()?),
            ScalarType::UInt64 => Value::U64(reader.read_scalar()?),
            ScalarType::SInt32 => Value::I32(reader.read_scalar::<SInt32>()?.0),
            ScalarType::SInt64 => Value::I64(reader.read_scalar::<SInt64>()?.0),
            ScalarType::Fixed32 => Value::U32(reader.read_scalar::<Fixed32>()?.0),
            ScalarType::Fixed64 => Value::U64(reader.read_scalar::<Fixed64>()?.0),
            ScalarType::SFixed32 => Value::I32(reader.read_scalar::<SFixed32>()?.0),
            ScalarType::SFixed64 => Value::I64(reader.read_scalar::<SFixed64>()?.0),
            ScalarType::Float => Value::F32(reader.read_scalar()?),
            ScalarType::Double => Value::F64(reader.read_scalar()?),
            ScalarType::String => Value::String(reader.read_scalar()?),
            ScalarType::Bytes => Value::Bytes(reader.read_scalar()?),
            ScalarType::Unit => {
                reader.skip_field(WireType::LengthDelimited)?;
                Value::Unit
            }
        };
        Ok(value)
    }

    fn encode_root(
        &self,
        value: &Value,
        writer: &mut WireWriter,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        match (self.scalar, value) {
            (ScalarType::Unit, Value::Unit) => Ok(()),
            _ => self.encode(value, writer, cx),
        }
    }

    fn decode_root(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Value> {
        match self.scalar {
            ScalarType::Unit => Ok(Value::Unit),
            _ => self.decode(reader, cx),
        }
    }
}

/// Serializer for a message type, driven by its [`ShapeDescriptor`].
#[derive(Debug, Clone)]
pub struct MessageSerializer {
    descriptor: Arc<ShapeDescriptor>,
}

impl MessageSerializer {
    pub fn new(descriptor: Arc<ShapeDescriptor>) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &Arc<ShapeDescriptor> {
        &self.descriptor
    }

    fn expect_message<'v>(&self, value: &'v Value) -> Result<&'v Message> {
        match value {
            Value::Message(message) if message.type_ref() == self.descriptor.type_ref() => {
                Ok(message)
            }
            other => Err(mismatch(self.descriptor.type_ref(), other)),
        }
    }
}

impl Serializer for MessageSerializer {
    fn type_ref(&self) -> &TypeRef {
        self.descriptor.type_ref()
    }

    fn wire_type(&self) -> WireType {
        WireType::LengthDelimited
    }

    fn encode(&self, value: &Value, writer: &mut WireWriter, cx: &mut Context<'_>) -> Result<()> {
        let message = self.expect_message(value)?;
        let encoder = StructuralEncoder::new(&self.descriptor);
        cx.nested(|cx| writer.write_nested(|body| encoder.encode(message, body, cx)))
    }

    fn decode(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Value> {
        let mut body = reader.read_nested()?;
        let decoder = StructuralDecoder::new(&self.descriptor);
        cx.nested(|cx| decoder.decode(&mut body, cx))
            .map(Value::Message)
    }

    fn encode_root(
        &self,
        value: &Value,
        writer: &mut WireWriter,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        let message = self.expect_message(value)?;
        StructuralEncoder::new(&self.descriptor).encode(message, writer, cx)
    }

    fn decode_root(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Value> {
        StructuralDecoder::new(&self.descriptor)
            .decode(reader, cx)
            .map(Value::Message)
    }

    fn merge(
        &self,
        existing: &mut Value,
        reader: &mut WireReader,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        match existing {
            Value::Message(target) if target.type_ref() == self.descriptor.type_ref() => {
                let mut body = reader.read_nested()?;
                let decoder = StructuralDecoder::new(&self.descriptor);
                cx.nested(|cx| decoder.merge_into(target, &mut body, cx))
            }
            _ => {
                *existing = self.decode(reader, cx)?;
                Ok(())
            }
        }
    }
}

/// Serializer for a field typed by an open base type.
///
/// Values are written as an envelope message carrying the concrete type's name
/// ([`DISCRIMINATOR_FIELD`]) and its payload ([`PAYLOAD_FIELD`]). The concrete serializer is
/// looked up in the registry among the subclasses registered for the base.
#[derive(Debug, Clone)]
pub struct PolymorphicSerializer {
    base: TypeIdentity,
    type_ref: TypeRef,
}

impl PolymorphicSerializer {
    pub fn new(base: TypeIdentity) -> Self {
        Self {
            type_ref: TypeRef::new(base.clone()),
            base,
        }
    }

    pub fn base(&self) -> &TypeIdentity {
        &self.base
    }
}

impl Serializer for PolymorphicSerializer {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn wire_type(&self) -> WireType {
        WireType::LengthDelimited
    }

    fn encode(&self, value: &Value, writer: &mut WireWriter, cx: &mut Context<'_>) -> Result<()> {
        let Value::Message(message) = value else {
            return Err(mismatch(format!("polymorphic {}", self.base), value));
        };
        let concrete = message.type_ref();
        if concrete.is_parametrized() {
            return Err(EncoderError::Encode(format!(
                "parametrized type {} cannot be a subclass of {}",
                concrete, self.base
            )));
        }
        let name = concrete.base().name();
        let serializer = cx.registry().resolve_subclass(&self.base, name)?;
        cx.nested(|cx| {
            writer.write_nested(|envelope| {
                envelope.write_tag(DISCRIMINATOR_FIELD, WireType::LengthDelimited);
                envelope.write_scalar(name)?;
                envelope.write_tag(PAYLOAD_FIELD, serializer.wire_type());
                serializer.encode(value, envelope, cx)
            })
        })
    }

    fn decode(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Value> {
        let mut envelope = reader.read_nested()?;
        cx.nested(|cx| {
            let mut discriminator: Option<String> = None;
            // The payload may precede the discriminator; keep its raw span until both are known.
            let mut payload = None;
            while let Some(tag) = envelope.read_tag()? {
                match tag.field_number {
                    DISCRIMINATOR_FIELD if tag.wire_type == WireType::LengthDelimited => {
                        discriminator = Some(envelope.read_scalar()?);
                    }
                    PAYLOAD_FIELD => {
                        payload = Some((tag.wire_type, envelope.read_field_span(tag.wire_type)?));
                    }
                    _ => envelope.skip_field(tag.wire_type)?,
                }
            }
            let name = discriminator.ok_or_else(|| {
                EncoderError::MalformedWireData(format!(
                    "polymorphic {} value carries no discriminator",
                    self.base
                ))
            })?;
            let serializer = cx.registry().resolve_subclass(&self.base, &name)?;
            let (wire_type, span) = payload.ok_or_else(|| {
                EncoderError::MalformedWireData(format!(
                    "polymorphic {} value of type {} carries no payload",
                    self.base, name
                ))
            })?;
            if wire_type != serializer.wire_type() {
                return Err(EncoderError::MalformedWireData(format!(
                    "payload of {} has wire type {}, expected {}",
                    name,
                    wire_type,
                    serializer.wire_type()
                )));
            }
            serializer.decode(&mut WireReader::new(span), cx)
        })
    }
}
