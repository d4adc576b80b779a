use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bcnp_frame::{FrameError, PacketReader, PacketWriter};
use bcnp_schema::SchemaHash;
use tracing::{debug, warn};

use crate::error::{HandshakeError, PeerError, Result};
use crate::session::Session;

/// Protocol identifier at the start of every handshake.
pub const MAGIC: [u8; 4] = *b"BCNP";

/// Magic (4) + big-endian schema hash (4).
pub const HANDSHAKE_SIZE: usize = 8;

/// Build the handshake a peer with `hash` sends.
pub fn encode_handshake(hash: SchemaHash) -> [u8; HANDSHAKE_SIZE] {
    let mut out = [0u8; HANDSHAKE_SIZE];
    out[..4].copy_from_slice(&MAGIC);
    out[4..].copy_from_slice(&hash.to_be_bytes());
    out
}

/// Check a received handshake against the local schema hash.
///
/// Returns the remote hash on success. Only the first eight bytes are
/// inspected; anything after them belongs to the packet stream.
pub fn validate_handshake(
    received: &[u8],
    local: SchemaHash,
) -> std::result::Result<SchemaHash, HandshakeError> {
    let Some(bytes) = received.first_chunk::<HANDSHAKE_SIZE>() else {
        return Err(HandshakeError::Incomplete {
            received: received.len(),
        });
    };

    let (magic, hash) = bytes.split_at(4);
    if magic != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(HandshakeError::BadMagic { found });
    }

    let mut raw = [0u8; 4];
    raw.copy_from_slice(hash);
    let remote = SchemaHash::from_be_bytes(raw);
    if remote != local {
        return Err(HandshakeError::SchemaMismatch { local, remote });
    }
    Ok(remote)
}

/// `true` iff `received` is a valid handshake for `local`.
pub fn is_valid_handshake(received: &[u8], local: SchemaHash) -> bool {
    validate_handshake(received, local).is_ok()
}

/// Where a connection stands in the handshake exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Unestablished,
    /// Local handshake sent; collecting the peer's eight bytes.
    AwaitingPeer,
    /// The peer's handshake matched. Packets may flow.
    Validated { remote: SchemaHash },
    /// Terminal. The connection must be closed without sending packets.
    Rejected(HandshakeError),
}

impl HandshakeState {
    fn name(&self) -> &'static str {
        match self {
            HandshakeState::Unestablished => "unestablished",
            HandshakeState::AwaitingPeer => "awaiting peer handshake",
            HandshakeState::Validated { .. } => "validated",
            HandshakeState::Rejected(_) => "rejected",
        }
    }
}

/// Sans-I/O handshake state machine for one connection.
///
/// ```text
/// Unestablished --start--> AwaitingPeer --8 bytes--> Validated | Rejected
/// ```
///
/// The peer's bytes may arrive in any fragmentation; [`feed`](Self::feed)
/// accumulates them and never takes more than the handshake needs.
#[derive(Debug, Clone)]
pub struct HandshakeNegotiator {
    local: SchemaHash,
    state: HandshakeState,
    received: [u8; HANDSHAKE_SIZE],
    filled: usize,
}

impl HandshakeNegotiator {
    pub fn new(local: SchemaHash) -> Self {
        Self {
            local,
            state: HandshakeState::Unestablished,
            received: [0u8; HANDSHAKE_SIZE],
            filled: 0,
        }
    }

    pub fn local_hash(&self) -> SchemaHash {
        self.local
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn is_validated(&self) -> bool {
        matches!(self.state, HandshakeState::Validated { .. })
    }

    /// Produce the local handshake and move to `AwaitingPeer`. The caller
    /// must send the returned bytes.
    pub fn start(&mut self) -> std::result::Result<[u8; HANDSHAKE_SIZE], HandshakeError> {
        match self.state {
            HandshakeState::Unestablished => {
                self.state = HandshakeState::AwaitingPeer;
                Ok(encode_handshake(self.local))
            }
            HandshakeState::Rejected(_) => Err(HandshakeError::Rejected),
            _ => Err(self.out_of_order("start")),
        }
    }

    /// Bytes still needed from the peer.
    pub fn remaining(&self) -> usize {
        match self.state {
            HandshakeState::Unestablished | HandshakeState::AwaitingPeer => {
                HANDSHAKE_SIZE - self.filled
            }
            _ => 0,
        }
    }

    /// Accept bytes from the peer.
    ///
    /// Returns how many bytes of `bytes` were consumed. Once eight bytes have
    /// arrived the state becomes `Validated` or `Rejected`; a rejection is
    /// also returned as the error.
    pub fn feed(&mut self, bytes: &[u8]) -> std::result::Result<usize, HandshakeError> {
        match self.state {
            HandshakeState::AwaitingPeer => {}
            HandshakeState::Rejected(_) => return Err(HandshakeError::Rejected),
            _ => return Err(self.out_of_order("accept peer bytes")),
        }

        let take = bytes.len().min(HANDSHAKE_SIZE - self.filled);
        self.received[self.filled..self.filled + take].copy_from_slice(&bytes[..take]);
        self.filled += take;

        if self.filled == HANDSHAKE_SIZE {
            match validate_handshake(&self.received, self.local) {
                Ok(remote) => self.state = HandshakeState::Validated { remote },
                Err(err) => {
                    self.state = HandshakeState::Rejected(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(take)
    }

    /// The peer's stream ended. Rejects with `Incomplete` unless already
    /// validated.
    pub fn close(&mut self) -> std::result::Result<SchemaHash, HandshakeError> {
        match &self.state {
            HandshakeState::Validated { remote } => Ok(*remote),
            HandshakeState::Rejected(err) => Err(err.clone()),
            HandshakeState::Unestablished | HandshakeState::AwaitingPeer => {
                let err = HandshakeError::Incomplete {
                    received: self.filled,
                };
                self.state = HandshakeState::Rejected(err.clone());
                Err(err)
            }
        }
    }

    fn out_of_order(&self, operation: &'static str) -> HandshakeError {
        HandshakeError::OutOfOrder {
            operation,
            state: self.state.name(),
        }
    }
}

/// Configuration for the blocking handshake exchange.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Deadline for receiving the peer's handshake.
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Exchange handshakes using default configuration.
pub fn exchange_handshake<R: Read, W: Write>(
    reader: PacketReader<R>,
    writer: PacketWriter<W>,
) -> Result<Session<R, W>> {
    exchange_handshake_with_config(reader, writer, &HandshakeConfig::default())
}

/// Send the local handshake, wait for the peer's and validate it.
///
/// The local hash is taken from the writer's schema, which must match the
/// reader's; nothing is sent otherwise. On success the reader and writer
/// become a [`Session`]; on failure they are dropped, closing the connection.
pub fn exchange_handshake_with_config<R: Read, W: Write>(
    mut reader: PacketReader<R>,
    mut writer: PacketWriter<W>,
    config: &HandshakeConfig,
) -> Result<Session<R, W>> {
    let local = writer.schema().hash();
    let reader_hash = reader.schema().hash();
    if reader_hash != local {
        return Err(HandshakeError::SplitSchema {
            reader: reader_hash,
            writer: local,
        }
        .into());
    }
    let mut negotiator = HandshakeNegotiator::new(local);

    let hello = negotiator.start()?;
    writer.write_raw(&hello)?;
    debug!(local = %local, "sent handshake");

    let deadline = Instant::now() + config.timeout;
    while !negotiator.is_validated() {
        if Instant::now() >= deadline {
            return Err(PeerError::Timeout(config.timeout));
        }

        match reader.read_raw(negotiator.remaining()) {
            Ok(chunk) => {
                if let Err(err) = negotiator.feed(&chunk) {
                    warn!(error = %err, "rejected peer handshake");
                    return Err(err.into());
                }
            }
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                let err = match negotiator.close() {
                    Err(err) => err,
                    Ok(_) => HandshakeError::Incomplete { received: 0 },
                };
                warn!(error = %err, "peer closed during handshake");
                return Err(err.into());
            }
            Err(err) => return Err(PeerError::Frame(err)),
        }
    }

    let remote = negotiator.close()?;
    debug!(remote = %remote, "handshake validated");
    Ok(Session::new(reader, writer, remote))
}
