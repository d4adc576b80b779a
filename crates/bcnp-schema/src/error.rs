use crate::descriptor::MessageTypeId;

/// Errors raised while loading or compiling a schema description.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema file could not be read.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The schema document is not valid JSON or does not match the
    /// description format.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The description violates a structural rule (empty names, bad scales,
    /// duplicate fields, limits).
    #[error("invalid schema description: {0}")]
    InvalidDescription(String),

    /// Two message descriptors share a type id.
    #[error("duplicate message type id {0}")]
    DuplicateMessageType(MessageTypeId),

    /// No layout is registered for the given type id.
    #[error("unknown message type {0}")]
    UnknownMessageType(MessageTypeId),
}

/// Errors from the fixed-point conversion.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum FixedPointError {
    /// The value (or the scale) is NaN or infinite.
    #[error("value {value} is not finite (scale {scale})")]
    NonFinite { value: f64, scale: f64 },

    /// `round(value * scale)` does not fit in a signed 32-bit integer.
    #[error("value {value} at scale {scale} overflows i32")]
    Overflow { value: f64, scale: f64 },
}

/// Errors raised while encoding or decoding a single record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    /// The record does not carry one value per declared field.
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    /// The value kind does not match the field type.
    #[error("field '{field}' expects a {expected} value")]
    KindMismatch {
        field: String,
        expected: &'static str,
    },

    /// An integer or float value does not fit in the wire type.
    #[error("field '{field}' value {value} does not fit in {ty}")]
    OutOfRange {
        field: String,
        value: String,
        ty: &'static str,
    },

    /// Fixed-point conversion failed.
    #[error("field '{field}': {source}")]
    FixedPoint {
        field: String,
        source: FixedPointError,
    },

    /// A float field holds NaN or infinity.
    #[error("field '{field}' is not a finite number")]
    NonFinite { field: String },

    /// A boolean byte other than 0 or 1.
    #[error("field '{field}' has invalid boolean byte 0x{raw:02x}")]
    InvalidBool { field: String, raw: u8 },

    /// Fewer bytes than the record's wire size.
    #[error("record needs {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

impl RecordError {
    /// True when the failure is a numeric value that cannot be represented
    /// on the wire.
    pub fn is_numeric_overflow(&self) -> bool {
        matches!(
            self,
            RecordError::OutOfRange { .. }
                | RecordError::FixedPoint { .. }
                | RecordError::NonFinite { .. }
        )
    }

    /// Name of the offending field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            RecordError::KindMismatch { field, .. }
            | RecordError::OutOfRange { field, .. }
            | RecordError::FixedPoint { field, .. }
            | RecordError::NonFinite { field }
            | RecordError::InvalidBool { field, .. } => Some(field),
            RecordError::FieldCount { .. } | RecordError::Truncated { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
