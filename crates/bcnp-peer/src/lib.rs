//! Connection-level negotiation for BCNP.
//!
//! Each side sends an 8-byte handshake (`"BCNP"` plus its schema hash) and
//! validates the one it receives. Only a validated exchange yields a
//! [`Session`], and only a session can send or receive packets.

pub mod error;
pub mod handshake;
pub mod session;

pub use error::{HandshakeError, PeerError, Result};
pub use handshake::{
    encode_handshake, exchange_handshake, exchange_handshake_with_config, is_valid_handshake,
    validate_handshake, HandshakeConfig, HandshakeNegotiator, HandshakeState, HANDSHAKE_SIZE, MAGIC,
};
pub use session::Session;
