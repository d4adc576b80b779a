use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};

use crate::config::RegistryConfig;
use crate::descriptor::{FieldDescriptor, FieldType, MessageDescriptor, MessageTypeId, SchemaDescription};
use crate::error::{RecordError, Result, SchemaError};
use crate::fixed;
use crate::record::{FieldValue, Record};

/// Compiled layout of one message type: encodes and decodes its records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    descriptor: MessageDescriptor,
    wire_size: usize,
}

impl RecordLayout {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        let wire_size = descriptor.wire_size();
        Self {
            descriptor,
            wire_size,
        }
    }

    pub fn id(&self) -> MessageTypeId {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// Fixed number of bytes per record.
    pub fn wire_size(&self) -> usize {
        self.wire_size
    }

    /// Append the record's wire form to `dst`.
    ///
    /// On error `dst` may hold a partially written record; callers that need
    /// all-or-nothing output encode into scratch space first.
    pub fn encode_record(&self, record: &Record, dst: &mut BytesMut) -> std::result::Result<(), RecordError> {
        let fields = &self.descriptor.fields;
        if record.len() != fields.len() {
            return Err(RecordError::FieldCount {
                expected: fields.len(),
                actual: record.len(),
            });
        }

        dst.reserve(self.wire_size);
        for (field, value) in fields.iter().zip(record.values()) {
            encode_field(field, *value, dst)?;
        }
        Ok(())
    }

    /// Decode one record from the first `wire_size` bytes of `src`.
    pub fn decode_record(&self, src: &[u8]) -> std::result::Result<Record, RecordError> {
        if src.len() < self.wire_size {
            return Err(RecordError::Truncated {
                expected: self.wire_size,
                actual: src.len(),
            });
        }

        let mut buf = &src[..self.wire_size];
        self.descriptor
            .fields
            .iter()
            .map(|field| decode_field(field, &mut buf))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Record::new)
    }
}

/// Read-only map from message type id to record layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRegistry {
    layouts: BTreeMap<MessageTypeId, RecordLayout>,
}

impl MessageRegistry {
    /// Build a registry from a description after validating it with default
    /// limits.
    pub fn from_description(description: &SchemaDescription) -> Result<Self> {
        Self::from_description_with_config(description, &RegistryConfig::default())
    }

    /// Build a registry from a description after validating it.
    pub fn from_description_with_config(
        description: &SchemaDescription,
        config: &RegistryConfig,
    ) -> Result<Self> {
        description.validate_with(config)?;
        Ok(Self::build(description))
    }

    /// Build without validation. Only for descriptions known to be valid.
    pub(crate) fn build(description: &SchemaDescription) -> Self {
        let layouts = description
            .messages
            .iter()
            .map(|message| (message.id, RecordLayout::new(message.clone())))
            .collect();
        Self { layouts }
    }

    /// Resolve a type id to its layout.
    pub fn lookup(&self, id: MessageTypeId) -> Result<&RecordLayout> {
        self.layouts
            .get(&id)
            .ok_or(SchemaError::UnknownMessageType(id))
    }

    pub fn get(&self, id: MessageTypeId) -> Option<&RecordLayout> {
        self.layouts.get(&id)
    }

    pub fn contains(&self, id: MessageTypeId) -> bool {
        self.layouts.contains_key(&id)
    }

    /// Registered type ids in ascending order.
    pub fn type_ids(&self) -> Vec<MessageTypeId> {
        self.layouts.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordLayout> {
        self.layouts.values()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

fn encode_field(
    field: &FieldDescriptor,
    value: FieldValue,
    dst: &mut BytesMut,
) -> std::result::Result<(), RecordError> {
    match field.ty {
        FieldType::U8 => dst.put_u8(int_value(field, value)?),
        FieldType::I8 => dst.put_i8(int_value(field, value)?),
        FieldType::U16 => dst.put_u16(int_value(field, value)?),
        FieldType::I16 => dst.put_i16(int_value(field, value)?),
        FieldType::U32 => dst.put_u32(int_value(field, value)?),
        FieldType::I32 => dst.put_i32(int_value(field, value)?),
        FieldType::Bool => {
            let v = value.as_bool().ok_or_else(|| kind_mismatch(field))?;
            dst.put_u8(u8::from(v));
        }
        FieldType::F32 => {
            let v = float_value(field, value)?;
            let narrowed = v as f32;
            if !narrowed.is_finite() {
                return Err(RecordError::OutOfRange {
                    field: field.name.clone(),
                    value: v.to_string(),
                    ty: field.ty.name(),
                });
            }
            dst.put_f32(narrowed);
        }
        FieldType::Fixed32 { scale } => {
            let v = float_value(field, value)?;
            let raw = fixed::to_fixed(v, scale).map_err(|source| RecordError::FixedPoint {
                field: field.name.clone(),
                source,
            })?;
            dst.put_i32(raw);
        }
    }
    Ok(())
}

fn decode_field(field: &FieldDescriptor, buf: &mut &[u8]) -> std::result::Result<FieldValue, RecordError> {
    let value = match field.ty {
        FieldType::U8 => FieldValue::Int(i64::from(buf.get_u8())),
        FieldType::I8 => FieldValue::Int(i64::from(buf.get_i8())),
        FieldType::U16 => FieldValue::Int(i64::from(buf.get_u16())),
        FieldType::I16 => FieldValue::Int(i64::from(buf.get_i16())),
        FieldType::U32 => FieldValue::Int(i64::from(buf.get_u32())),
        FieldType::I32 => FieldValue::Int(i64::from(buf.get_i32())),
        FieldType::Bool => match buf.get_u8() {
            0 => FieldValue::Bool(false),
            1 => FieldValue::Bool(true),
            raw => {
                return Err(RecordError::InvalidBool {
                    field: field.name.clone(),
                    raw,
                })
            }
        },
        FieldType::F32 => {
            let v = buf.get_f32();
            if !v.is_finite() {
                return Err(RecordError::NonFinite {
                    field: field.name.clone(),
                });
            }
            FieldValue::Float(f64::from(v))
        }
        FieldType::Fixed32 { scale } => {
            let v = fixed::from_fixed(buf.get_i32(), scale);
            if !v.is_finite() {
                return Err(RecordError::NonFinite {
                    field: field.name.clone(),
                });
            }
            FieldValue::Float(v)
        }
    };
    Ok(value)
}

fn int_value<T: TryFrom<i64>>(field: &FieldDescriptor, value: FieldValue) -> std::result::Result<T, RecordError> {
    let v = value.as_i64().ok_or_else(|| kind_mismatch(field))?;
    T::try_from(v).map_err(|_| RecordError::OutOfRange {
        field: field.name.clone(),
        value: v.to_string(),
        ty: field.ty.name(),
    })
}

fn float_value(field: &FieldDescriptor, value: FieldValue) -> std::result::Result<f64, RecordError> {
    let v = value.as_f64().ok_or_else(|| kind_mismatch(field))?;
    if !v.is_finite() {
        return Err(RecordError::NonFinite {
            field: field.name.clone(),
        });
    }
    Ok(v)
}

fn kind_mismatch(field: &FieldDescriptor) -> RecordError {
    RecordError::KindMismatch {
        field: field.name.clone(),
        expected: match field.ty {
            FieldType::Bool => "boolean",
            FieldType::F32 | FieldType::Fixed32 { .. } => "numeric",
            _ => "integer",
        },
    }
}
