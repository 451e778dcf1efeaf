//! # senax-protobuf
//!
//! A descriptor-driven, Protocol-Buffers-compatible binary serialization engine.
//!
//! - Encodes and decodes the protobuf wire format: tag/wire-type framing, base-128 varints,
//!   zig-zag signed integers, fixed 32/64-bit scalars and length-delimited payloads
//! - Walks runtime shape descriptors (ordered, numbered fields with declared kinds) instead of
//!   generated code, so new message types can be added without recompiling the engine
//! - Resolves the serializer for a type at first use and caches it for the life of the process,
//!   including generic (parametrized) and polymorphic types
//! - Tolerates unknown fields, arbitrary field order and duplicated fields on decode
//!
//! ## Layers
//!
//! - [`varint`]: base-128 varints and zig-zag mapping.
//! - [`core`](crate::core): [`Encoder`]/[`Decoder`] for Rust scalars (the primitive codec).
//! - [`wire`]: [`WireWriter`]/[`WireReader`] cursors, [`WireTag`] and [`WireType`].
//! - [`descriptor`]: [`TypeIdentity`], [`TypeRef`] and [`ShapeDescriptor`].
//! - [`value`]: the dynamic [`Value`] tree that descriptor-driven encoding operates on.
//! - [`serializer`]: the [`Serializer`] strategy trait and its scalar, message and polymorphic
//!   implementations.
//! - [`structural`]: [`StructuralEncoder`]/[`StructuralDecoder`], the per-field descriptor walk.
//! - [`registry`] / [`parametrized`]: [`SerializerRegistry`] and its caches.
//!
//! ## Example
//!
//! ```rust
//! use senax_protobuf::{
//!     FieldKind, Message, ScalarType, SerializerRegistry, ShapeDescriptor, TypeRef, Value,
//! };
//!
//! let point = ShapeDescriptor::builder("example.Point")
//!     .field(1, "x", FieldKind::Primitive(ScalarType::SInt32))
//!     .field(2, "y", FieldKind::Primitive(ScalarType::SInt32))
//!     .build()
//!     .unwrap();
//!
//! let registry = SerializerRegistry::builder()
//!     .register_descriptor(point)
//!     .build();
//!
//! let ty = TypeRef::new("example.Point");
//! let value = Value::Message(Message::new(ty.clone()).with(1, -3i32).with(2, 7i32));
//! let bytes = registry.encode(&ty, &value).unwrap();
//! assert_eq!(registry.decode(&ty, bytes).unwrap(), value);
//! ```

mod cache;
pub mod config;
pub mod core;
pub mod descriptor;
pub mod parametrized;
pub mod registry;
pub mod serializer;
pub mod structural;
pub mod value;
pub mod varint;
pub mod wire;

use bytes::{Bytes, BytesMut};

pub use cache::ResolutionState;
pub use config::CodecConfig;
pub use crate::core::{Fixed32, Fixed64, SFixed32, SFixed64, SInt32, SInt64};
pub use descriptor::{
    ElementKind, FieldDescriptor, FieldKind, ScalarType, ShapeDescriptor, ShapeDescriptorBuilder,
    TypeIdentity, TypeRef,
};
pub use parametrized::{ParametrizedKey, ParametrizedSerializerCache};
pub use registry::{
    DescriptorProvider, DescriptorResult, DescriptorSet, RegistrationTable, RegistryBuilder,
    Resolution, SerializerCache, SerializerRegistry,
};
pub use serializer::{
    Context, MessageSerializer, PolymorphicSerializer, ScalarSerializer, Serializer,
    SharedSerializer,
};
pub use structural::{StructuralDecoder, StructuralEncoder};
pub use value::{MapKey, Message, Value};
pub use wire::{WireReader, WireTag, WireType, WireWriter};

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// A varint ran past its maximum length, a tag carried an invalid wire type or field
    /// number, or a payload could not be interpreted as its declared kind.
    #[error("Malformed wire data: {0}")]
    MalformedWireData(String),
    /// A fixed-width or length-delimited payload extends past the end of the input.
    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },
    /// A polymorphic discriminator names a type with no registered concrete serializer.
    #[error("Unknown polymorphic type '{0}'")]
    UnknownPolymorphicType(String),
    /// Every resolution source was consulted and none produced a serializer.
    #[error("Serializer not found for {0}")]
    SerializerNotFound(TypeRef),
    /// A value does not have the shape its field kind declares.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    /// Nested messages went deeper than [`CodecConfig::recursion_limit`].
    #[error("Recursion limit of {0} exceeded")]
    RecursionLimitExceeded(usize),
    /// The value could not be encoded (e.g., out-of-range narrow integer).
    #[error("Encode error: {0}")]
    Encode(String),
    /// Serializer resolution failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// The result type used throughout this crate for encode/decode operations.
///
/// All `Encoder`, `Decoder` and [`Serializer`] methods return this type.
pub type Result<T> = std::result::Result<T, EncoderError>;

/// Failures raised while resolving a serializer.
///
/// These are distinct from "no serializer exists", which the registry reports as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Descriptor for {type_name} is malformed: {reason}")]
    MalformedDescriptor { type_name: String, reason: String },
    #[error("Descriptor provider failed for {type_name}: {reason}")]
    Provider { type_name: String, reason: String },
    /// Any failure of a parametrized factory, including a panic.
    #[error("Failed to resolve parametrized type {key}: {reason}")]
    Parametrized { key: String, reason: String },
}

/// Convenience function to decode a value from bytes.
///
/// This is equivalent to calling `T::decode(reader)` but provides a more ergonomic API.
///
/// # Example
/// ```rust
/// use senax_protobuf::{decode, encode};
///
/// let mut buf = encode("string").unwrap();
/// assert_eq!(&buf[..], b"\x06string");
/// let decoded: String = decode(&mut buf).unwrap();
/// assert_eq!(decoded, "string");
/// ```
pub fn decode<T: Decoder>(reader: &mut Bytes) -> Result<T> {
    T::decode(reader)
}

/// Convenience function to encode a value to bytes.
///
/// The result is the bare payload as it would follow a field tag, e.g. `true` is `01` and
/// `1.0f32` is `00 00 80 3F`.
///
/// # Example
/// ```rust
/// use senax_protobuf::encode;
///
/// assert_eq!(&encode(&true).unwrap()[..], &[0x01]);
/// assert_eq!(&encode(&'c').unwrap()[..], &[0x63]);
/// assert!(encode(&()).unwrap().is_empty());
/// ```
pub fn encode<T: Encoder + ?Sized>(value: &T) -> Result<Bytes> {
    let mut writer = BytesMut::new();
    value.encode(&mut writer)?;
    Ok(writer.freeze())
}

/// Trait for Rust scalars that have a protobuf wire representation.
///
/// Implementations write only the payload; the tag is the caller's concern (see
/// [`WireWriter::write_tag`]).
///
/// # Errors
/// Returns `EncoderError` if the value cannot be encoded.
pub trait Encoder {
    /// The wire type a field of this type is tagged with.
    const WIRE_TYPE: WireType;

    /// Encode the payload of the value into the given buffer.
    ///
    /// # Arguments
    /// * `writer` - The buffer to write the encoded bytes into.
    fn encode(&self, writer: &mut BytesMut) -> Result<()>;

    /// Returns true if this value equals its default value.
    /// Used for default elision of singular fields.
    fn is_default(&self) -> bool;
}

/// Trait for Rust scalars that can be decoded from a protobuf payload.
///
/// # Errors
/// Returns `EncoderError` if the value cannot be decoded or the data is invalid.
pub trait Decoder: Sized {
    /// Decode the payload of a value from the given buffer.
    ///
    /// # Arguments
    /// * `reader` - The buffer to read the encoded bytes from.
    fn decode(reader: &mut Bytes) -> Result<Self>;
}
