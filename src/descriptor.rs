//! Type identities and shape descriptors.
//!
//! A [`ShapeDescriptor`] is the static description of one message type: its numbered fields
//! and their declared kinds. Descriptors are produced once (by a
//! [`DescriptorProvider`](crate::DescriptorProvider) or by hand) and shared behind an `Arc` for
//! the rest of the process.

use crate::value::Value;
use crate::wire::{WireTag, WireType};
use crate::ResolutionError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque, cheaply clonable name of a type.
///
/// Two identities are equal iff their names are equal; the name is also the discriminator
/// written for polymorphic values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentity(Arc<str>);

impl TypeIdentity {
    pub fn new(name: impl AsRef<str>) -> Self {
        TypeIdentity(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIdentity({})", self.0)
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeIdentity {
    fn from(name: &str) -> Self {
        TypeIdentity::new(name)
    }
}

impl From<String> for TypeIdentity {
    fn from(name: String) -> Self {
        TypeIdentity(Arc::from(name))
    }
}

/// A possibly generic type: a base identity applied to an ordered list of type arguments.
///
/// `Map<int32, string>` and `Map<string, int32>` are different `TypeRef`s.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    base: TypeIdentity,
    args: Arc<[TypeRef]>,
}

impl TypeRef {
    /// A non-generic type.
    pub fn new(base: impl Into<TypeIdentity>) -> Self {
        TypeRef {
            base: base.into(),
            args: Arc::from(Vec::new()),
        }
    }

    /// A generic type applied to `args`, in order.
    pub fn parametrized(
        base: impl Into<TypeIdentity>,
        args: impl IntoIterator<Item = TypeRef>,
    ) -> Self {
        TypeRef {
            base: base.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn base(&self) -> &TypeIdentity {
        &self.base
    }

    pub fn args(&self) -> &[TypeRef] {
        &self.args
    }

    pub fn is_parametrized(&self) -> bool {
        !self.args.is_empty()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if self.is_parametrized() {
            f.write_str("<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", arg)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self)
    }
}

impl From<TypeIdentity> for TypeRef {
    fn from(base: TypeIdentity) -> Self {
        TypeRef::new(base)
    }
}

impl From<&TypeIdentity> for TypeRef {
    fn from(base: &TypeIdentity) -> Self {
        TypeRef::new(base.clone())
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::new(name)
    }
}

/// Protobuf scalar kinds.
///
/// Every scalar has a built-in serializer registered under [`ScalarType::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Char,
    /// Varint, range-checked to `i8` on both sides.
    Int8,
    /// Varint, range-checked to `i16` on both sides.
    Int16,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Float,
    Double,
    String,
    Bytes,
    Unit,
}

impl ScalarType {
    pub const ALL: [ScalarType; 19] = [
        ScalarType::Bool,
        ScalarType::Char,
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::UInt32,
        ScalarType::UInt64,
        ScalarType::SInt32,
        ScalarType::SInt64,
        ScalarType::Fixed32,
        ScalarType::Fixed64,
        ScalarType::SFixed32,
        ScalarType::SFixed64,
        ScalarType::Float,
        ScalarType::Double,
        ScalarType::String,
        ScalarType::Bytes,
        ScalarType::Unit,
    ];

    /// The registry name of the built-in serializer.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Char => "char",
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::SInt32 => "sint32",
            ScalarType::SInt64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::SFixed32 => "sfixed32",
            ScalarType::SFixed64 => "sfixed64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Unit => "unit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scalar| scalar.name() == name)
    }

    pub fn type_ref(self) -> TypeRef {
        TypeRef::new(self.name())
    }

    pub fn wire_type(self) -> WireType {
        match self {
            ScalarType::Bool
            | ScalarType::Char
            | ScalarType::Int8
            | ScalarType::Int16
            | ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::UInt32
            | ScalarType::UInt64
            | ScalarType::SInt32
            | ScalarType::SInt64 => WireType::Varint,
            ScalarType::Fixed32 | ScalarType::SFixed32 | ScalarType::Float => WireType::Fixed32,
            ScalarType::Fixed64 | ScalarType::SFixed64 | ScalarType::Double => WireType::Fixed64,
            ScalarType::String | ScalarType::Bytes | ScalarType::Unit => WireType::LengthDelimited,
        }
    }

    /// Whether a repeated field of this scalar may use the packed encoding.
    pub fn is_packable(self) -> bool {
        self.wire_type() != WireType::LengthDelimited
    }

    /// Whether a map field may be keyed by this scalar: integral kinds, `bool`, `char` and
    /// strings, matching [`MapKey`](crate::MapKey).
    pub fn is_map_key(self) -> bool {
        !matches!(
            self,
            ScalarType::Float | ScalarType::Double | ScalarType::Bytes | ScalarType::Unit
        )
    }

    /// The zero value used when a field declares no default.
    pub fn default_value(self) -> Value {
        match self {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Char => Value::Char('\0'),
            ScalarType::Int8
            | ScalarType::Int16
            | ScalarType::Int32
            | ScalarType::SInt32
            | ScalarType::SFixed32 => Value::I32(0),
            ScalarType::Int64 | ScalarType::SInt64 | ScalarType::SFixed64 => Value::I64(0),
            ScalarType::UInt32 | ScalarType::Fixed32 => Value::U32(0),
            ScalarType::UInt64 | ScalarType::Fixed64 => Value::U64(0),
            ScalarType::Float => Value::F32(0.0),
            ScalarType::Double => Value::F64(0.0),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(bytes::Bytes::new()),
            ScalarType::Unit => Value::Unit,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a collection element or map value holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Primitive(ScalarType),
    Nested(TypeRef),
    /// An open hierarchy rooted at the given base; the concrete type travels on the wire.
    Polymorphic(TypeIdentity),
}

impl ElementKind {
    fn describe(&self) -> String {
        match self {
            ElementKind::Primitive(scalar) => scalar.to_string(),
            ElementKind::Nested(ty) => ty.to_string(),
            ElementKind::Polymorphic(base) => format!("polymorphic {}", base),
        }
    }
}

/// The declared kind of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Primitive(ScalarType),
    Nested(TypeRef),
    Polymorphic(TypeIdentity),
    /// Repeated field, one tag per element unless packed.
    ///
    /// `packed: None` defers to [`CodecConfig::pack_repeated_scalars`](crate::CodecConfig).
    /// Packing only ever applies to packable scalar elements.
    Collection {
        element: ElementKind,
        packed: Option<bool>,
    },
    /// Each entry is written as an implicit message `{ 1: key, 2: value }`.
    Map { key: ScalarType, value: ElementKind },
}

impl FieldKind {
    /// Shorthand for an unpacked-by-config collection.
    pub fn repeated(element: ElementKind) -> Self {
        FieldKind::Collection {
            element,
            packed: None,
        }
    }

    pub fn map(key: ScalarType, value: ElementKind) -> Self {
        FieldKind::Map { key, value }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldKind::Primitive(scalar) => scalar.to_string(),
            FieldKind::Nested(ty) => ty.to_string(),
            FieldKind::Polymorphic(base) => format!("polymorphic {}", base),
            FieldKind::Collection { element, .. } => format!("repeated {}", element.describe()),
            FieldKind::Map { key, value } => format!("map<{}, {}>", key, value.describe()),
        }
    }
}

/// One numbered field of a [`ShapeDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    number: u32,
    name: String,
    kind: FieldKind,
    default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(number: u32, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            number,
            name: name.into(),
            kind,
            default: None,
        }
    }

    /// Declares a default other than the kind's zero value. Only meaningful for primitive
    /// fields.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn declared_default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The value an absent field reads as.
    ///
    /// Nested and polymorphic fields have no default: absence is their "unset" state.
    pub fn default_value(&self) -> Option<Value> {
        match &self.kind {
            FieldKind::Primitive(scalar) => {
                Some(self.default.clone().unwrap_or_else(|| scalar.default_value()))
            }
            FieldKind::Collection { .. } => Some(Value::List(Vec::new())),
            FieldKind::Map { .. } => Some(Value::Map(Default::default())),
            FieldKind::Nested(_) | FieldKind::Polymorphic(_) => None,
        }
    }

    /// Whether `value` may be left off the wire because decode would restore it anyway.
    pub fn is_elidable(&self, value: &Value) -> bool {
        match &self.kind {
            FieldKind::Primitive(ScalarType::Unit) => true,
            FieldKind::Primitive(_) => self
                .default_value()
                .is_some_and(|default| value.bitwise_eq(&default)),
            FieldKind::Collection { .. } => matches!(value, Value::List(items) if items.is_empty()),
            FieldKind::Map { .. } => matches!(value, Value::Map(entries) if entries.is_empty()),
            FieldKind::Nested(_) | FieldKind::Polymorphic(_) => false,
        }
    }
}

/// Immutable description of one message type.
///
/// Field numbers are unique; field order is the encode order. Lookup by number is O(1).
#[derive(Debug, Clone)]
pub struct ShapeDescriptor {
    type_ref: TypeRef,
    fields: Vec<FieldDescriptor>,
    index: HashMap<u32, usize, ahash::RandomState>,
}

impl ShapeDescriptor {
    /// Validates `fields` and builds the number index.
    ///
    /// # Errors
    /// Returns `MalformedDescriptor` if a field number is repeated or outside
    /// `1..=WireTag::MAX_FIELD_NUMBER`, or a map field is keyed by a float, bytes or unit.
    pub fn new(
        type_ref: impl Into<TypeRef>,
        fields: Vec<FieldDescriptor>,
    ) -> std::result::Result<Self, ResolutionError> {
        let type_ref = type_ref.into();
        let mut index = HashMap::with_capacity_and_hasher(fields.len(), Default::default());
        for (position, field) in fields.iter().enumerate() {
            if field.number == 0 || field.number > WireTag::MAX_FIELD_NUMBER {
                return Err(ResolutionError::MalformedDescriptor {
                    type_name: type_ref.to_string(),
                    reason: format!(
                        "field '{}' has number {} outside 1..={}",
                        field.name,
                        field.number,
                        WireTag::MAX_FIELD_NUMBER
                    ),
                });
            }
            if let FieldKind::Map { key, .. } = &field.kind {
                if !key.is_map_key() {
                    return Err(ResolutionError::MalformedDescriptor {
                        type_name: type_ref.to_string(),
                        reason: format!("map field '{}' cannot be keyed by {}", field.name, key),
                    });
                }
            }
            if let Some(previous) = index.insert(field.number, position) {
                return Err(ResolutionError::MalformedDescriptor {
                    type_name: type_ref.to_string(),
                    reason: format!(
                        "field number {} declared twice ('{}' and '{}')",
                        field.number, fields[previous].name, field.name
                    ),
                });
            }
        }
        Ok(Self {
            type_ref,
            fields,
            index,
        })
    }

    pub fn builder(type_ref: impl Into<TypeRef>) -> ShapeDescriptorBuilder {
        ShapeDescriptorBuilder {
            type_ref: type_ref.into(),
            fields: Vec::new(),
        }
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Fields in declaration (encode) order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.index.get(&number).map(|&position| &self.fields[position])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Incremental construction of a [`ShapeDescriptor`]; validation happens in `build`.
#[derive(Debug, Clone)]
pub struct ShapeDescriptorBuilder {
    type_ref: TypeRef,
    fields: Vec<FieldDescriptor>,
}

impl ShapeDescriptorBuilder {
    pub fn field(mut self, number: u32, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(number, name, kind));
        self
    }

    pub fn push(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> std::result::Result<ShapeDescriptor, ResolutionError> {
        ShapeDescriptor::new(self.type_ref, self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_field_number_is_rejected() {
        let result = ShapeDescriptor::builder("example.Dup")
            .field(1, "a", FieldKind::Primitive(ScalarType::Int32))
            .field(1, "b", FieldKind::Primitive(ScalarType::String))
            .build();
        assert!(matches!(
            result,
            Err(ResolutionError::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn test_field_number_bounds() {
        for number in [0, WireTag::MAX_FIELD_NUMBER + 1] {
            let result = ShapeDescriptor::builder("example.Bounds")
                .field(number, "a", FieldKind::Primitive(ScalarType::Int32))
                .build();
            assert!(result.is_err(), "number {} accepted", number);
        }
    }

    #[test]
    fn test_map_key_kinds() {
        for key in [ScalarType::Float, ScalarType::Double, ScalarType::Bytes, ScalarType::Unit] {
            let result = ShapeDescriptor::builder("example.BadKey")
                .field(1, "m", FieldKind::map(key, ElementKind::Primitive(ScalarType::Int32)))
                .build();
            assert!(
                matches!(result, Err(ResolutionError::MalformedDescriptor { .. })),
                "{} key accepted",
                key
            );
        }
        let keys = ScalarType::ALL.into_iter().filter(|scalar| scalar.is_map_key());
        for key in keys {
            ShapeDescriptor::builder("example.GoodKey")
                .field(1, "m", FieldKind::map(key, ElementKind::Primitive(ScalarType::Int32)))
                .build()
                .unwrap();
        }
    }

    #[test]
    fn test_lookup_by_number_and_name() {
        let descriptor = ShapeDescriptor::builder("example.Lookup")
            .field(7, "seven", FieldKind::Primitive(ScalarType::Bool))
            .field(3, "three", FieldKind::Primitive(ScalarType::String))
            .build()
            .unwrap();
        assert_eq!(descriptor.field(3).unwrap().name(), "three");
        assert_eq!(descriptor.field_by_name("seven").unwrap().number(), 7);
        assert!(descriptor.field(4).is_none());
        assert_eq!(descriptor.fields()[0].number(), 7);
    }

    #[test]
    fn test_type_ref_display_and_order() {
        let a = TypeRef::parametrized("Map", [TypeRef::new("int32"), TypeRef::new("string")]);
        let b = TypeRef::parametrized("Map", [TypeRef::new("string"), TypeRef::new("int32")]);
        assert_eq!(a.to_string(), "Map<int32, string>");
        assert_ne!(a, b);
    }

    #[test]
    fn test_elision_uses_bitwise_float_comparison() {
        let field = FieldDescriptor::new(1, "f", FieldKind::Primitive(ScalarType::Double));
        assert!(field.is_elidable(&Value::F64(0.0)));
        assert!(!field.is_elidable(&Value::F64(-0.0)));
    }
}
