use std::fmt;

use bcnp_schema::SchemaHash;

/// Reasons a peer handshake is rejected. All are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The peer sent fewer than 8 bytes before the stream ended.
    #[error("incomplete handshake ({received} of 8 bytes)")]
    Incomplete { received: usize },

    /// The first four bytes are not `"BCNP"`.
    #[error("bad handshake magic {}", Escaped(.found))]
    BadMagic { found: [u8; 4] },

    /// The peer was built from a different schema.
    #[error("schema mismatch (local {local}, remote {remote})")]
    SchemaMismatch { local: SchemaHash, remote: SchemaHash },

    /// The reader and writer of one connection were built from different schemas.
    #[error("reader schema {reader} differs from writer schema {writer}")]
    SplitSchema { reader: SchemaHash, writer: SchemaHash },

    /// The negotiator already rejected the peer and accepts no more input.
    #[error("handshake already rejected")]
    Rejected,

    /// A negotiator operation was called in the wrong state.
    #[error("cannot {operation} while {state}")]
    OutOfOrder {
        operation: &'static str,
        state: &'static str,
    },
}

struct Escaped<'a>(&'a [u8; 4]);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Packet-level error.
    #[error("frame error: {0}")]
    Frame(#[from] bcnp_frame::FrameError),

    /// Handshake rejected.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// No data arrived within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// I/O error configuring the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
