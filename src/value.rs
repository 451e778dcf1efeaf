//! Dynamic values walked by the descriptor-driven encoder.

use crate::descriptor::{FieldDescriptor, TypeRef};
use crate::EncoderError;
use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::{btree_map, BTreeMap};

/// A value of any kind a field can hold.
///
/// Equality is structural and follows IEEE rules for floats (`NaN != NaN`); use
/// [`Value::bitwise_eq`] to compare floats bit for bit.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Char(char),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    Message(Message),
    List(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
}

impl Value {
    /// Short name of the variant, used in type-mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Like `==`, except floats compare by bit pattern, so `NaN` equals an identical `NaN`
    /// and `-0.0` differs from `0.0`.
    pub fn bitwise_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.bitwise_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.bitwise_eq(other)))
            }
            (Value::Message(a), Value::Message(b)) => a.bitwise_eq(b),
            _ => self == other,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}
impl_value_from!(
    bool => Bool,
    char => Char,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    Bytes => Bytes,
    Message => Message,
    Vec<Value> => List,
    IndexMap<MapKey, Value> => Map,
);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// Keys a protobuf map may use: integral kinds, `bool`, `char` and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Char(char),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(String),
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Bool(v) => Value::Bool(v),
            MapKey::Char(v) => Value::Char(v),
            MapKey::I32(v) => Value::I32(v),
            MapKey::I64(v) => Value::I64(v),
            MapKey::U32(v) => Value::U32(v),
            MapKey::U64(v) => Value::U64(v),
            MapKey::String(v) => Value::String(v),
        }
    }
}

impl TryFrom<Value> for MapKey {
    type Error = EncoderError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(v) => Ok(MapKey::Bool(v)),
            Value::Char(v) => Ok(MapKey::Char(v)),
            Value::I32(v) => Ok(MapKey::I32(v)),
            Value::I64(v) => Ok(MapKey::I64(v)),
            Value::U32(v) => Ok(MapKey::U32(v)),
            Value::U64(v) => Ok(MapKey::U64(v)),
            Value::String(v) => Ok(MapKey::String(v)),
            other => Err(EncoderError::TypeMismatch {
                expected: "map key".to_string(),
                actual: other.kind_name().to_string(),
            }),
        }
    }
}

impl From<&str> for MapKey {
    fn from(key: &str) -> Self {
        MapKey::String(key.to_string())
    }
}

impl From<i32> for MapKey {
    fn from(key: i32) -> Self {
        MapKey::I32(key)
    }
}

/// A message instance: the fields present, keyed by field number.
///
/// Absent fields read as their descriptor default; see [`Message::get_or_default`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    type_ref: TypeRef,
    fields: BTreeMap<u32, Value>,
}

impl Message {
    pub fn new(type_ref: impl Into<TypeRef>) -> Self {
        Self {
            type_ref: type_ref.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style [`Message::set`].
    pub fn with(mut self, number: u32, value: impl Into<Value>) -> Self {
        self.set(number, value);
        self
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, number: u32, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(number, value.into())
    }

    pub fn get(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Value> {
        self.fields.get_mut(&number)
    }

    pub fn remove(&mut self, number: u32) -> Option<Value> {
        self.fields.remove(&number)
    }

    /// The present value, else the field's default (`None` for an unset nested field).
    pub fn get_or_default(&self, field: &FieldDescriptor) -> Option<Value> {
        self.get(field.number())
            .cloned()
            .or_else(|| field.default_value())
    }

    /// Present fields in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.fields.iter().map(|(number, value)| (*number, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn bitwise_eq(&self, other: &Message) -> bool {
        self.type_ref == other.type_ref
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((na, va), (nb, vb))| na == nb && va.bitwise_eq(vb))
    }

    pub(crate) fn entry(&mut self, number: u32) -> btree_map::Entry<'_, u32, Value> {
        self.fields.entry(number)
    }
}
