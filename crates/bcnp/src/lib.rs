//! Binary command network protocol.
//!
//! A client streams batches of fixed-layout command records to a real-time
//! controller. Connections open with a schema-hash handshake; each packet
//! carries a version header, a homogeneous batch of big-endian records and a
//! CRC-32 trailer.
//!
//! # Crate Structure
//!
//! - [`schema`]: message descriptors, fixed-point encoding, schema hash
//! - [`frame`]: packet codec and blocking stream reader/writer
//! - [`peer`]: handshake and validated sessions (behind `peer` feature)

/// Re-export schema types.
pub mod schema {
    pub use bcnp_schema::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bcnp_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use bcnp_peer::*;
}
