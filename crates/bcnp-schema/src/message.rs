//! Statically typed messages.
//!
//! A [`Message`] is a Rust struct whose layout matches one entry of the
//! schema description. The packet codec converts between these structs and
//! dynamic [`Record`]s.

use serde::{Deserialize, Serialize};

use crate::descriptor::{FieldType, MessageDescriptor, MessageTypeId};
use crate::error::RecordError;
use crate::fixed::{ANGULAR_VELOCITY_SCALE, LINEAR_VELOCITY_SCALE};
use crate::record::{FieldValue, Record};

/// A fixed-layout command record with a known type id.
pub trait Message: Sized {
    const TYPE_ID: MessageTypeId;
    const NAME: &'static str;

    /// The descriptor this type encodes against. Must match the entry in
    /// the schema description the peers agreed on.
    fn descriptor() -> MessageDescriptor;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self, RecordError>;
}

/// Drive the base: linear velocity `vx` (m/s), angular rate `omega`
/// (rad/s), held for `duration_ms` milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveCmd {
    pub vx: f32,
    pub omega: f32,
    #[serde(rename = "durationMs")]
    pub duration_ms: u16,
}

impl DriveCmd {
    pub fn new(vx: f32, omega: f32, duration_ms: u16) -> Self {
        Self {
            vx,
            omega,
            duration_ms,
        }
    }
}

impl Message for DriveCmd {
    const TYPE_ID: MessageTypeId = MessageTypeId::DRIVE_CMD;
    const NAME: &'static str = "DriveCmd";

    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new(Self::TYPE_ID, Self::NAME)
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
            .field("durationMs", FieldType::U16)
    }

    fn to_record(&self) -> Record {
        Record::new(vec![
            FieldValue::from(self.vx),
            FieldValue::from(self.omega),
            FieldValue::from(self.duration_ms),
        ])
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        let [vx, omega, duration] = record.values() else {
            return Err(RecordError::FieldCount {
                expected: 3,
                actual: record.len(),
            });
        };

        Ok(Self {
            vx: float_field("vx", *vx)?,
            omega: float_field("omega", *omega)?,
            duration_ms: u16_field("durationMs", *duration)?,
        })
    }
}

fn float_field(name: &str, value: FieldValue) -> Result<f32, RecordError> {
    let v = value.as_f64().ok_or_else(|| RecordError::KindMismatch {
        field: name.to_string(),
        expected: "numeric",
    })?;
    let narrowed = v as f32;
    if !narrowed.is_finite() {
        return Err(RecordError::NonFinite {
            field: name.to_string(),
        });
    }
    Ok(narrowed)
}

fn u16_field(name: &str, value: FieldValue) -> Result<u16, RecordError> {
    let v = value.as_i64().ok_or_else(|| RecordError::KindMismatch {
        field: name.to_string(),
        expected: "integer",
    })?;
    u16::try_from(v).map_err(|_| RecordError::OutOfRange {
        field: name.to_string(),
        value: v.to_string(),
        ty: "u16",
    })
}
