//! Schema identity: a 32-bit fingerprint of the message schema in use.
//!
//! The hash covers the protocol version, the header layout version and every
//! message's id, name and ordered fields (names, types, fixed-point scales).
//! Peers built from the same description compute the same value on any
//! platform; changing any of those inputs changes it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::{FieldType, MessageDescriptor, SchemaDescription};

/// Version of the packet header layout. Part of the schema hash.
pub const HEADER_LAYOUT_VERSION: u8 = 1;

const HASH_DOMAIN: &[u8] = b"BCNP-SCHEMA";

/// Fingerprint of a schema description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaHash(pub u32);

impl SchemaHash {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::UpperHex for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Protocol version carried in every packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// The version this implementation speaks.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 2, minor: 4 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Derive the schema hash from a description and protocol version.
///
/// Messages are visited in ascending type-id order, so the order in which
/// they appear in the description does not matter. Field order does.
pub fn compute_hash(description: &SchemaDescription, version: ProtocolVersion) -> SchemaHash {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(HASH_DOMAIN);
    hasher.update(&[version.major, version.minor, HEADER_LAYOUT_VERSION]);

    let mut messages: Vec<&MessageDescriptor> = description.messages.iter().collect();
    messages.sort_by_key(|message| message.id);

    update_len(&mut hasher, messages.len());
    for message in messages {
        hasher.update(&message.id.get().to_be_bytes());
        update_str(&mut hasher, &message.name);
        update_len(&mut hasher, message.fields.len());
        for field in &message.fields {
            update_str(&mut hasher, &field.name);
            hasher.update(&[field.ty.tag()]);
            if let FieldType::Fixed32 { scale } = field.ty {
                hasher.update(&scale.to_bits().to_be_bytes());
            }
        }
    }

    SchemaHash(hasher.finalize())
}

fn update_len(hasher: &mut crc32fast::Hasher, len: usize) {
    hasher.update(&(len as u32).to_be_bytes());
}

fn update_str(hasher: &mut crc32fast::Hasher, value: &str) {
    update_len(hasher, value.len());
    hasher.update(value.as_bytes());
}
