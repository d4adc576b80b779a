//! Message schema layer for BCNP.
//!
//! Describes the fixed-layout records carried in packets, encodes their
//! physical quantities as fixed-point integers, and derives the 32-bit
//! schema hash that peers compare during the handshake.
//!
//! A [`Schema`] is compiled once at startup and shared read-only between
//! every connection; nothing in this crate mutates state after that.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fixed;
pub mod identity;
pub mod message;
pub mod record;
pub mod registry;
pub mod schema;

pub use config::RegistryConfig;
pub use descriptor::{FieldDescriptor, FieldType, MessageDescriptor, MessageTypeId, SchemaDescription};
pub use error::{FixedPointError, RecordError, Result, SchemaError};
pub use fixed::{from_fixed, to_fixed, ANGULAR_VELOCITY_SCALE, LINEAR_VELOCITY_SCALE};
pub use identity::{compute_hash, ProtocolVersion, SchemaHash, HEADER_LAYOUT_VERSION};
pub use message::{DriveCmd, Message};
pub use record::{FieldValue, Record};
pub use registry::{MessageRegistry, RecordLayout};
pub use schema::Schema;
