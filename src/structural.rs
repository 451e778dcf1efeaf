//! Descriptor-driven message encoding and decoding.
//!
//! Encoding walks the descriptor's fields in declaration order. Decoding walks the wire and
//! looks each tag up by number, so field order is irrelevant, unknown fields are skipped and
//! repeated occurrences follow protobuf merge rules: singular scalars keep the last value,
//! nested messages merge, collections append and maps insert.

use crate::descriptor::{ElementKind, FieldDescriptor, FieldKind, ScalarType, ShapeDescriptor};
use crate::serializer::{Context, PolymorphicSerializer, Serializer, SharedSerializer};
use crate::value::{MapKey, Message, Value};
use crate::wire::{WireReader, WireType, WireWriter};
use crate::{EncoderError, Result};
use std::collections::btree_map::Entry;
use std::sync::Arc;

/// Field number of a map entry's key.
pub const MAP_KEY_FIELD: u32 = 1;
/// Field number of a map entry's value.
pub const MAP_VALUE_FIELD: u32 = 2;

fn element_serializer(element: &ElementKind, cx: &Context<'_>) -> Result<SharedSerializer> {
    match element {
        ElementKind::Primitive(scalar) => cx.require(&scalar.type_ref()),
        ElementKind::Nested(ty) => cx.require(ty),
        ElementKind::Polymorphic(base) => Ok(Arc::new(PolymorphicSerializer::new(base.clone()))),
    }
}

fn field_mismatch(field: &FieldDescriptor, value: &Value) -> EncoderError {
    EncoderError::TypeMismatch {
        expected: format!("{} for field '{}'", field.kind().describe(), field.name()),
        actual: value.kind_name().to_string(),
    }
}

fn wire_type_mismatch(
    field: &FieldDescriptor,
    expected: WireType,
    actual: WireType,
) -> EncoderError {
    EncoderError::MalformedWireData(format!(
        "field {} ('{}') has wire type {}, expected {}",
        field.number(),
        field.name(),
        actual,
        expected
    ))
}

/// Writes the fields of one message body.
pub struct StructuralEncoder<'d> {
    descriptor: &'d ShapeDescriptor,
}

impl<'d> StructuralEncoder<'d> {
    pub fn new(descriptor: &'d ShapeDescriptor) -> Self {
        Self { descriptor }
    }

    /// Encodes the present fields of `message` in declaration order.
    ///
    /// Fields equal to their default are elided unless
    /// [`CodecConfig::encode_defaults`](crate::CodecConfig) is set; unit fields are always
    /// elided. Values set under numbers the descriptor does not declare are not written.
    pub fn encode(
        &self,
        message: &Message,
        writer: &mut WireWriter,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        for field in self.descriptor.fields() {
            let Some(value) = message.get(field.number()) else {
                continue;
            };
            let elide = if matches!(field.kind(), FieldKind::Primitive(ScalarType::Unit)) {
                true
            } else {
                !cx.config().encode_defaults && field.is_elidable(value)
            };
            if elide {
                continue;
            }
            self.encode_field(field, value, writer, cx)?;
        }
        Ok(())
    }

    fn encode_field(
        &self,
        field: &FieldDescriptor,
        value: &Value,
        writer: &mut WireWriter,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        let number = field.number();
        match field.kind() {
            FieldKind::Primitive(scalar) => {
                let serializer = cx.require(&scalar.type_ref())?;
                writer.write_tag(number, serializer.wire_type());
                serializer.encode(value, writer, cx)
            }
            FieldKind::Nested(ty) => {
                let serializer = cx.require(ty)?;
                writer.write_tag(number, serializer.wire_type());
                serializer.encode(value, writer, cx)
            }
            FieldKind::Polymorphic(base) => {
                let serializer = PolymorphicSerializer::new(base.clone());
                writer.write_tag(number, WireType::LengthDelimited);
                serializer.encode(value, writer, cx)
            }
            FieldKind::Collection { element, packed } => {
                let Value::List(items) = value else {
                    return Err(field_mismatch(field, value));
                };
                let serializer = element_serializer(element, cx)?;
                let packable =
                    matches!(element, ElementKind::Primitive(scalar) if scalar.is_packable());
                let packed = packable && packed.unwrap_or(cx.config().pack_repeated_scalars);
                if packed {
                    if items.is_empty() {
                        return Ok(());
                    }
                    writer.write_tag(number, WireType::LengthDelimited);
                    writer.write_nested(|run| {
                        items
                            .iter()
                            .try_for_each(|item| serializer.encode(item, run, cx))
                    })
                } else {
                    for item in items {
                        writer.write_tag(number, serializer.wire_type());
                        serializer.encode(item, writer, cx)?;
                    }
                    Ok(())
                }
            }
            FieldKind::Map { key, value: element } => {
                let Value::Map(entries) = value else {
                    return Err(field_mismatch(field, value));
                };
                let key_serializer = cx.require(&key.type_ref())?;
                let value_serializer = element_serializer(element, cx)?;
                for (entry_key, entry_value) in entries {
                    let entry_key = Value::from(entry_key.clone());
                    writer.write_tag(number, WireType::LengthDelimited);
                    cx.nested(|cx| {
                        writer.write_nested(|entry| {
                            entry.write_tag(MAP_KEY_FIELD, key_serializer.wire_type());
                            key_serializer.encode(&entry_key, entry, cx)?;
                            entry.write_tag(MAP_VALUE_FIELD, value_serializer.wire_type());
                            value_serializer.encode(entry_value, entry, cx)
                        })
                    })?;
                }
                Ok(())
            }
        }
    }
}

/// Reads message bodies.
pub struct StructuralDecoder<'d> {
    descriptor: &'d ShapeDescriptor,
}

impl<'d> StructuralDecoder<'d> {
    pub fn new(descriptor: &'d ShapeDescriptor) -> Self {
        Self { descriptor }
    }

    /// Decodes fields until `reader` is exhausted.
    ///
    /// Absent fields are left unset; read them through
    /// [`Message::get_or_default`](crate::Message::get_or_default).
    pub fn decode(&self, reader: &mut WireReader, cx: &mut Context<'_>) -> Result<Message> {
        let mut message = Message::new(self.descriptor.type_ref().clone());
        self.merge_into(&mut message, reader, cx)?;
        Ok(message)
    }

    /// Decodes fields until `reader` is exhausted, merging them into `message`.
    pub fn merge_into(
        &self,
        message: &mut Message,
        reader: &mut WireReader,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        while let Some(tag) = reader.read_tag()? {
            match self.descriptor.field(tag.field_number) {
                Some(field) => self.decode_field(field, tag.wire_type, message, reader, cx)?,
                None => {
                    tracing::trace!(
                        message = %self.descriptor.type_ref(),
                        field = tag.field_number,
                        wire_type = %tag.wire_type,
                        "skipping unknown field"
                    );
                    reader.skip_field(tag.wire_type)?;
                }
            }
        }
        Ok(())
    }

    fn decode_field(
        &self,
        field: &FieldDescriptor,
        wire_type: WireType,
        message: &mut Message,
        reader: &mut WireReader,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        let number = field.number();
        match field.kind() {
            FieldKind::Primitive(ScalarType::Unit) => {
                reader.skip_field(wire_type)?;
                message.set(number, Value::Unit);
                Ok(())
            }
            FieldKind::Primitive(scalar) => {
                let serializer = cx.require(&scalar.type_ref())?;
                self.decode_singular(field, &serializer, wire_type, message, reader, cx)
            }
            FieldKind::Nested(ty) => {
                let serializer = cx.require(ty)?;
                self.decode_singular(field, &serializer, wire_type, message, reader, cx)
            }
            FieldKind::Polymorphic(base) => {
                let serializer: SharedSerializer =
                    Arc::new(PolymorphicSerializer::new(base.clone()));
                self.decode_singular(field, &serializer, wire_type, message, reader, cx)
            }
            FieldKind::Collection { element, .. } => {
                let serializer = element_serializer(element, cx)?;
                let element_wire_type = serializer.wire_type();
                let mut decoded = Vec::new();
                if wire_type == element_wire_type {
                    decoded.push(serializer.decode(reader, cx)?);
                } else if wire_type == WireType::LengthDelimited
                    && matches!(element, ElementKind::Primitive(scalar) if scalar.is_packable())
                {
                    // Packed run, accepted whatever the descriptor's packing preference.
                    let mut run = reader.read_nested()?;
                    while !run.is_empty() {
                        decoded.push(serializer.decode(&mut run, cx)?);
                    }
                } else {
                    return Err(wire_type_mismatch(field, element_wire_type, wire_type));
                }
                match message.entry(number).or_insert_with(|| Value::List(Vec::new())) {
                    Value::List(items) => items.extend(decoded),
                    slot => *slot = Value::List(decoded),
                }
                Ok(())
            }
            FieldKind::Map { key, value: element } => {
                if wire_type != WireType::LengthDelimited {
                    return Err(wire_type_mismatch(field, WireType::LengthDelimited, wire_type));
                }
                let key_serializer = cx.require(&key.type_ref())?;
                let value_serializer = element_serializer(element, cx)?;
                let mut entry = reader.read_nested()?;
                let (entry_key, entry_value) = cx.nested(|cx| {
                    let mut entry_key = None;
                    let mut entry_value: Option<Value> = None;
                    while let Some(tag) = entry.read_tag()? {
                        match tag.field_number {
                            MAP_KEY_FIELD => {
                                if tag.wire_type != key_serializer.wire_type() {
                                    return Err(wire_type_mismatch(
                                        field,
                                        key_serializer.wire_type(),
                                        tag.wire_type,
                                    ));
                                }
                                entry_key = Some(key_serializer.decode(&mut entry, cx)?);
                            }
                            MAP_VALUE_FIELD => {
                                if tag.wire_type != value_serializer.wire_type() {
                                    return Err(wire_type_mismatch(
                                        field,
                                        value_serializer.wire_type(),
                                        tag.wire_type,
                                    ));
                                }
                                match entry_value.as_mut() {
                                    Some(existing) => {
                                        value_serializer.merge(existing, &mut entry, cx)?
                                    }
                                    None => {
                                        entry_value = Some(value_serializer.decode(&mut entry, cx)?)
                                    }
                                }
                            }
                            _ => entry.skip_field(tag.wire_type)?,
                        }
                    }
                    Ok((entry_key, entry_value))
                })?;
                // Protobuf writers may omit a key or value that equals its default.
                let entry_key = entry_key.unwrap_or_else(|| key.default_value());
                let entry_key = MapKey::try_from(entry_key)
                    .map_err(|e| EncoderError::MalformedWireData(e.to_string()))?;
                let entry_value = match entry_value {
                    Some(value) => value,
                    None => Self::missing_map_value(field, element)?,
                };
                match message.entry(number) {
                    Entry::Occupied(mut occupied) => match occupied.get_mut() {
                        Value::Map(entries) => {
                            entries.insert(entry_key, entry_value);
                        }
                        slot => {
                            *slot = Value::Map([(entry_key, entry_value)].into_iter().collect())
                        }
                    },
                    Entry::Vacant(vacant) => {
                        vacant.insert(Value::Map([(entry_key, entry_value)].into_iter().collect()));
                    }
                }
                Ok(())
            }
        }
    }

    fn decode_singular(
        &self,
        field: &FieldDescriptor,
        serializer: &SharedSerializer,
        wire_type: WireType,
        message: &mut Message,
        reader: &mut WireReader,
        cx: &mut Context<'_>,
    ) -> Result<()> {
        if wire_type != serializer.wire_type() {
            return Err(wire_type_mismatch(field, serializer.wire_type(), wire_type));
        }
        match message.entry(field.number()) {
            Entry::Occupied(mut occupied) => serializer.merge(occupied.get_mut(), reader, cx),
            Entry::Vacant(vacant) => {
                vacant.insert(serializer.decode(reader, cx)?);
                Ok(())
            }
        }
    }

    fn missing_map_value(field: &FieldDescriptor, element: &ElementKind) -> Result<Value> {
        match element {
            ElementKind::Primitive(scalar) => Ok(scalar.default_value()),
            ElementKind::Nested(ty) => Ok(Value::Message(Message::new(ty.clone()))),
            ElementKind::Polymorphic(base) => Err(EncoderError::MalformedWireData(format!(
                "map entry of field '{}' has no {} value",
                field.name(),
                base
            ))),
        }
    }
}
