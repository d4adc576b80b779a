use std::io::{ErrorKind, Write};
use std::sync::Arc;

use bcnp_schema::{Message, MessageTypeId, Record, Schema};
use bytes::BytesMut;
use tracing::debug;

use crate::codec::{encode_packet, FrameConfig};
use crate::error::{EncodeError, FrameError, Result};
use crate::flags::Flags;
use crate::stream::TimeoutStream;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete packets to any `Write` stream.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    schema: Arc<Schema>,
    config: FrameConfig,
}

impl<T: Write> PacketWriter<T> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: T, schema: Arc<Schema>) -> Self {
        Self::with_config(inner, schema, FrameConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: T, schema: Arc<Schema>, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            schema,
            config,
        }
    }

    /// Encode and send one batch of `type_id` records (blocking).
    pub fn write_packet(&mut self, type_id: MessageTypeId, records: &[Record], flags: Flags) -> Result<()> {
        if records.len() > self.config.max_records_per_packet {
            return Err(FrameError::Encode(EncodeError::BatchTooLarge {
                count: records.len(),
                max: self.config.max_records_per_packet,
            }));
        }

        self.buf.clear();
        encode_packet(&self.schema, type_id, records, flags, &mut self.buf)?;
        self.write_buffered()?;
        debug!(
            type_id = %type_id,
            records = records.len(),
            bytes = self.buf.len(),
            "sent packet"
        );
        Ok(())
    }

    /// Encode and send a batch of typed messages.
    pub fn send<M: Message>(&mut self, messages: &[M], flags: Flags) -> Result<()> {
        let records: Vec<Record> = messages.iter().map(Message::to_record).collect();
        self.write_packet(M::TYPE_ID, &records, flags)
    }

    /// Write raw bytes that are already framed, such as a handshake.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update the batch limit for subsequent packets.
    pub fn set_max_records_per_packet(&mut self, max: usize) {
        self.config.max_records_per_packet = max;
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Write + TimeoutStream> PacketWriter<T> {
    /// Create a packet writer and apply the write timeout from config.
    pub fn with_config_timeout(inner: T, schema: Arc<Schema>, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, schema, config))
    }
}
