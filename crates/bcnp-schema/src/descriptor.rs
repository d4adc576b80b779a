//! Schema descriptions: message type ids, field names, field types and order.

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::fixed::{self, ANGULAR_VELOCITY_SCALE, LINEAR_VELOCITY_SCALE};

const MAX_NAME_LEN: usize = 64;

/// Numeric identifier of a message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTypeId(pub u16);

impl MessageTypeId {
    /// Built-in drive command.
    pub const DRIVE_CMD: MessageTypeId = MessageTypeId(1);

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for MessageTypeId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire type of a record field. All multi-byte types are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    Bool,
    F32,
    /// Float carried as `round(value * scale)` in an `i32`.
    Fixed32 { scale: f64 },
}

impl FieldType {
    /// Bytes this field occupies on the wire.
    pub fn wire_size(self) -> usize {
        match self {
            FieldType::U8 | FieldType::I8 | FieldType::Bool => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 | FieldType::F32 | FieldType::Fixed32 { .. } => 4,
        }
    }

    /// Short type name used in diagnostics and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::U8 => "u8",
            FieldType::I8 => "i8",
            FieldType::U16 => "u16",
            FieldType::I16 => "i16",
            FieldType::U32 => "u32",
            FieldType::I32 => "i32",
            FieldType::Bool => "bool",
            FieldType::F32 => "f32",
            FieldType::Fixed32 { .. } => "fixed32",
        }
    }

    /// Stable tag fed into the schema hash. Never renumber.
    pub(crate) fn tag(self) -> u8 {
        match self {
            FieldType::U8 => 1,
            FieldType::I8 => 2,
            FieldType::U16 => 3,
            FieldType::I16 => 4,
            FieldType::U32 => 5,
            FieldType::I32 => 6,
            FieldType::Bool => 7,
            FieldType::F32 => 8,
            FieldType::Fixed32 { .. } => 9,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Fixed32 { scale } => write!(f, "fixed32(scale={scale})"),
            other => f.write_str(other.name()),
        }
    }
}

/// One named field of a message record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Layout of one message kind: its id, name and ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub id: MessageTypeId,
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    /// Start a descriptor with no fields.
    pub fn new(id: impl Into<MessageTypeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field (builder style). Field order is wire order.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor::new(name, ty));
        self
    }

    /// Fixed record size in bytes.
    pub fn wire_size(&self) -> usize {
        self.fields.iter().map(|field| field.ty.wire_size()).sum()
    }

    fn validate(&self, config: &RegistryConfig) -> Result<()> {
        validate_name("message name", &self.name)?;

        if self.fields.is_empty() {
            return Err(SchemaError::InvalidDescription(format!(
                "message '{}' has no fields",
                self.name
            )));
        }
        if self.fields.len() > config.max_fields_per_message {
            return Err(SchemaError::InvalidDescription(format!(
                "message '{}' has {} fields (max {})",
                self.name,
                self.fields.len(),
                config.max_fields_per_message
            )));
        }

        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            validate_name("field name", &field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::InvalidDescription(format!(
                    "message '{}' declares field '{}' twice",
                    self.name, field.name
                )));
            }
            if let FieldType::Fixed32 { scale } = field.ty {
                if !fixed::is_valid_scale(scale) {
                    return Err(SchemaError::InvalidDescription(format!(
                        "field '{}.{}' has invalid scale {scale}",
                        self.name, field.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// The full set of message types two peers agree on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub messages: Vec<MessageDescriptor>,
}

impl SchemaDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message type (builder style).
    pub fn with_message(mut self, message: MessageDescriptor) -> Self {
        self.messages.push(message);
        self
    }

    /// The protocol's built-in schema: `DriveCmd` only.
    pub fn builtin() -> Self {
        Self::new().with_message(
            MessageDescriptor::new(MessageTypeId::DRIVE_CMD, "DriveCmd")
                .field(
                    "vx",
                    FieldType::Fixed32 {
                        scale: LINEAR_VELOCITY_SCALE,
                    },
                )
                .field(
                    "omega",
                    FieldType::Fixed32 {
                        scale: ANGULAR_VELOCITY_SCALE,
                    },
                )
                .field("durationMs", FieldType::U16),
        )
    }

    /// Parse a description from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let description: Self = serde_json::from_str(json)?;
        Ok(description)
    }

    /// Load a description from a JSON file with default limits.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_path_with_config(path, &RegistryConfig::default())
    }

    /// Load a description from a JSON file, refusing files over the
    /// configured size.
    pub fn from_path_with_config(path: &Path, config: &RegistryConfig) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;
        let metadata = file
            .metadata()
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;
        if !metadata.is_file() {
            return Err(SchemaError::LoadFailed(format!(
                "{}: not a regular file",
                path.display()
            )));
        }
        if metadata.len() > config.max_schema_file_size as u64 {
            return Err(SchemaError::LoadFailed(format!(
                "schema file too large ({} bytes): {}",
                metadata.len(),
                path.display()
            )));
        }

        let read_limit = u64::try_from(config.max_schema_file_size.saturating_add(1))
            .unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;
        if content.len() > config.max_schema_file_size {
            return Err(SchemaError::LoadFailed(format!(
                "schema file too large while reading: {}",
                path.display()
            )));
        }

        let description = Self::from_json_str(&content)?;
        debug!(
            path = %path.display(),
            messages = description.messages.len(),
            "loaded schema description"
        );
        Ok(description)
    }

    /// Look up a message descriptor by id.
    pub fn message(&self, id: MessageTypeId) -> Option<&MessageDescriptor> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Check structural rules with default limits.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&RegistryConfig::default())
    }

    /// Check structural rules: at least one message, unique ids and names,
    /// valid field names and scales.
    pub fn validate_with(&self, config: &RegistryConfig) -> Result<()> {
        if self.messages.is_empty() {
            return Err(SchemaError::InvalidDescription(
                "schema declares no message types".to_string(),
            ));
        }
        if self.messages.len() > config.max_message_types {
            return Err(SchemaError::InvalidDescription(format!(
                "schema declares {} message types (max {})",
                self.messages.len(),
                config.max_message_types
            )));
        }

        let mut ids = HashSet::with_capacity(self.messages.len());
        let mut names = HashSet::with_capacity(self.messages.len());
        for message in &self.messages {
            if !ids.insert(message.id) {
                return Err(SchemaError::DuplicateMessageType(message.id));
            }
            if !names.insert(message.name.as_str()) {
                return Err(SchemaError::InvalidDescription(format!(
                    "message name '{}' is used twice",
                    message.name
                )));
            }
            message.validate(config)?;
        }

        Ok(())
    }
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(SchemaError::InvalidDescription(format!(
            "invalid {what} length: {}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(SchemaError::InvalidDescription(format!(
            "invalid {what} '{name}': only ASCII letters, digits and '_' are allowed"
        )));
    }
    Ok(())
}
