use crate::config::RegistryConfig;
use crate::descriptor::{MessageTypeId, SchemaDescription};
use crate::error::Result;
use crate::identity::{compute_hash, ProtocolVersion, SchemaHash};
use crate::registry::{MessageRegistry, RecordLayout};

/// A compiled schema: the description, its record layouts and its hash.
///
/// Immutable once built. Share it between connections with `Arc<Schema>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    version: ProtocolVersion,
    description: SchemaDescription,
    registry: MessageRegistry,
    hash: SchemaHash,
}

impl Schema {
    /// Compile a description for the current protocol version.
    pub fn compile(description: SchemaDescription) -> Result<Self> {
        Self::compile_with_config(description, ProtocolVersion::CURRENT, &RegistryConfig::default())
    }

    /// Compile a description for an explicit protocol version.
    pub fn compile_with_version(description: SchemaDescription, version: ProtocolVersion) -> Result<Self> {
        Self::compile_with_config(description, version, &RegistryConfig::default())
    }

    pub fn compile_with_config(
        description: SchemaDescription,
        version: ProtocolVersion,
        config: &RegistryConfig,
    ) -> Result<Self> {
        let registry = MessageRegistry::from_description_with_config(&description, config)?;
        let hash = compute_hash(&description, version);
        Ok(Self {
            version,
            description,
            registry,
            hash,
        })
    }

    /// The built-in schema (`DriveCmd`) at the current protocol version.
    pub fn builtin() -> Self {
        let description = SchemaDescription::builtin();
        let version = ProtocolVersion::CURRENT;
        Self {
            registry: MessageRegistry::build(&description),
            hash: compute_hash(&description, version),
            version,
            description,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn hash(&self) -> SchemaHash {
        self.hash
    }

    pub fn description(&self) -> &SchemaDescription {
        &self.description
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Resolve a type id to its record layout.
    pub fn layout(&self, id: MessageTypeId) -> Result<&RecordLayout> {
        self.registry.lookup(id)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::builtin()
    }
}
