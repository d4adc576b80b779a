use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use bcnp_frame::{Flags, FrameError, Packet, PacketReader, PacketWriter, ReaderStats, TimeoutStream};
use bcnp_schema::{Message, MessageTypeId, Record, Schema, SchemaHash};

use crate::error::{PeerError, Result};

/// A connection whose peer has presented a matching schema hash.
///
/// Created only by [`exchange_handshake`](crate::exchange_handshake), so
/// packets are never sent or decoded on an unvalidated connection.
pub struct Session<R, W> {
    reader: PacketReader<R>,
    writer: PacketWriter<W>,
    remote_hash: SchemaHash,
    read_timeout: Option<Duration>,
}

impl<R: Read, W: Write> Session<R, W> {
    pub(crate) fn new(reader: PacketReader<R>, writer: PacketWriter<W>, remote_hash: SchemaHash) -> Self {
        let read_timeout = reader.config().read_timeout;
        Self {
            reader,
            writer,
            remote_hash,
            read_timeout,
        }
    }

    /// Schema hash the peer announced. Equal to the local hash.
    pub fn remote_hash(&self) -> SchemaHash {
        self.remote_hash
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.writer.schema()
    }

    /// Send one homogeneous batch of records.
    pub fn send_batch(&mut self, type_id: MessageTypeId, records: &[Record], flags: Flags) -> Result<()> {
        self.writer
            .write_packet(type_id, records, flags)
            .map_err(|err| self.map_frame_error(err))
    }

    /// Send a batch of typed messages.
    pub fn send<M: Message>(&mut self, messages: &[M], flags: Flags) -> Result<()> {
        self.writer
            .send(messages, flags)
            .map_err(|err| self.map_frame_error(err))
    }

    /// Receive the next packet, decoding its records as `type_id`.
    pub fn recv_batch(&mut self, type_id: MessageTypeId) -> Result<Packet> {
        self.reader.set_type_id(type_id);
        self.reader
            .read_packet()
            .map_err(|err| self.map_frame_error(err))
    }

    /// Receive the next packet as typed messages.
    pub fn recv<M: Message>(&mut self) -> Result<(Flags, Vec<M>)> {
        let packet = self.recv_batch(M::TYPE_ID)?;
        let messages = packet
            .messages::<M>()
            .map_err(|err| PeerError::Frame(FrameError::Decode(err)))?;
        Ok((packet.flags(), messages))
    }

    pub fn reader_stats(&self) -> ReaderStats {
        self.reader.stats()
    }

    /// Split back into the validated reader and writer.
    pub fn into_parts(self) -> (PacketReader<R>, PacketWriter<W>) {
        (self.reader, self.writer)
    }

    fn map_frame_error(&self, err: FrameError) -> PeerError {
        match err {
            FrameError::ConnectionClosed => PeerError::Disconnected("connection closed".to_string()),
            FrameError::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                PeerError::Timeout(self.read_timeout.unwrap_or_default())
            }
            other => PeerError::Frame(other),
        }
    }
}

impl<R: Read + TimeoutStream, W: Write> Session<R, W> {
    /// Bound subsequent receives by `timeout`.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }
}

impl<R: Read, W: Write> fmt::Debug for Session<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("remote_hash", &self.remote_hash)
            .field("read_timeout", &self.read_timeout)
            .field("reader_stats", &self.reader.stats())
            .finish_non_exhaustive()
    }
}
