/// Limits applied when loading and validating schema descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of message types in one schema.
    pub max_message_types: usize,
    /// Maximum number of fields in one message type.
    pub max_fields_per_message: usize,
    /// Maximum bytes allowed for a schema file loaded from disk.
    pub max_schema_file_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_message_types: 256,
            max_fields_per_message: 64,
            max_schema_file_size: 256 * 1024,
        }
    }
}
