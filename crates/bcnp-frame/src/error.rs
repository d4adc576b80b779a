use bcnp_schema::{MessageTypeId, ProtocolVersion, RecordError};

/// Errors raised while building a packet. Nothing is written on error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// More records than the 16-bit count field (or the configured limit)
    /// allows.
    #[error("batch of {count} records exceeds the maximum of {max}")]
    BatchTooLarge { count: usize, max: usize },

    /// A numeric value cannot be represented in its wire type.
    #[error("record {index}: field '{field}' is out of range for its wire type")]
    NumericOverflow { index: usize, field: String },

    /// The schema has no layout for the requested type id.
    #[error("unknown message type {0}")]
    UnknownMessageType(MessageTypeId),

    /// A record does not match the layout (field count or value kind).
    #[error("record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: RecordError },
}

impl EncodeError {
    pub(crate) fn from_record(index: usize, err: RecordError) -> Self {
        if err.is_numeric_overflow() {
            EncodeError::NumericOverflow {
                index,
                field: err.field().unwrap_or_default().to_string(),
            }
        } else {
            EncodeError::InvalidRecord { index, reason: err }
        }
    }
}

/// Errors raised while parsing a packet. No partial result is ever returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the header, or than the length the header implies.
    #[error("packet truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The trailing CRC-32 does not match the packet contents.
    #[error("checksum mismatch (carried 0x{carried:08X}, computed 0x{computed:08X})")]
    ChecksumMismatch { carried: u32, computed: u32 },

    /// A record failed to decode (bad boolean byte, non-finite float, ...).
    #[error("record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: RecordError },

    /// The schema has no layout for the requested type id.
    #[error("unknown message type {0}")]
    UnknownMessageType(MessageTypeId),

    /// The header carries a protocol version this peer does not speak.
    #[error("unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion {
        found: ProtocolVersion,
        expected: ProtocolVersion,
    },

    /// Bytes remain after the checksum.
    #[error("{extra} trailing bytes after packet")]
    TrailingBytes { extra: usize },
}

/// Errors from the blocking packet reader and writer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A complete packet was received but rejected. Its bytes have been
    /// consumed, so the next read starts at the following packet.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A header announced more records than the reader accepts. Buffered
    /// bytes are discarded.
    #[error("packet announces {count} records (max {max})")]
    PacketTooLarge { count: usize, max: usize },

    /// An I/O error occurred while reading or writing packets.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended, possibly in the middle of a packet.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
