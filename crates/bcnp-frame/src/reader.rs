use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bcnp_schema::{MessageTypeId, Schema};
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::codec::{decode_packet_from, FrameConfig, Packet, PacketHeader};
use crate::error::{DecodeError, FrameError, Result};
use crate::stream::TimeoutStream;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Running counters for a [`PacketReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Packets decoded successfully.
    pub packets: u64,
    /// Packets rejected (checksum, version, record or size errors).
    pub errors: u64,
    /// Rejections since the last good packet.
    pub consecutive_errors: u32,
}

/// Reads complete packets of one message type from any `Read` stream.
///
/// Handles partial reads internally; callers always get whole packets. A
/// rejected packet is consumed, so reading can continue after a
/// [`FrameError::Decode`].
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    schema: Arc<Schema>,
    type_id: MessageTypeId,
    config: FrameConfig,
    stats: ReaderStats,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T, schema: Arc<Schema>, type_id: MessageTypeId) -> Self {
        Self::with_config(inner, schema, type_id, FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(
        inner: T,
        schema: Arc<Schema>,
        type_id: MessageTypeId,
        config: FrameConfig,
    ) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            schema,
            type_id,
            config,
            stats: ReaderStats::default(),
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.try_decode()? {
                return Ok(packet);
            }

            if let Err(err) = self.fill() {
                if matches!(err, FrameError::ConnectionClosed) && !self.buf.is_empty() {
                    debug!(buffered = self.buf.len(), "stream closed mid-packet");
                }
                return Err(err);
            }
        }
    }

    /// Take up to `max` raw bytes, reading from the stream only when nothing
    /// is buffered. Bytes past `max` stay buffered for packet decoding.
    pub fn read_raw(&mut self, max: usize) -> Result<Bytes> {
        if max == 0 {
            return Ok(Bytes::new());
        }
        if self.buf.is_empty() {
            self.fill()?;
        }
        let n = max.min(self.buf.len());
        Ok(self.buf.split_to(n).freeze())
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn try_decode(&mut self) -> Result<Option<Packet>> {
        if let Some(header) = PacketHeader::parse(&self.buf) {
            let count = usize::from(header.count);
            if count > self.config.max_records_per_packet {
                self.buf.clear();
                self.record_error();
                warn!(
                    count,
                    max = self.config.max_records_per_packet,
                    "packet exceeds record limit, discarding buffered bytes"
                );
                return Err(FrameError::PacketTooLarge {
                    count,
                    max: self.config.max_records_per_packet,
                });
            }
        }

        match decode_packet_from(&self.schema, self.type_id, &mut self.buf) {
            Ok(Some(packet)) => {
                self.stats.packets += 1;
                self.stats.consecutive_errors = 0;
                debug!(
                    type_id = %self.type_id,
                    records = packet.len(),
                    flags = %packet.flags(),
                    "received packet"
                );
                Ok(Some(packet))
            }
            Ok(None) => Ok(None),
            Err(err @ DecodeError::UnknownMessageType(_)) => Err(FrameError::Decode(err)),
            Err(err) => {
                self.record_error();
                warn!(
                    error = %err,
                    consecutive = self.stats.consecutive_errors,
                    "rejected packet"
                );
                Err(FrameError::Decode(err))
            }
        }
    }

    fn record_error(&mut self) {
        self.stats.errors += 1;
        self.stats.consecutive_errors = self.stats.consecutive_errors.saturating_add(1);
    }

    /// Counters since creation (or the last [`reset_stats`](Self::reset_stats)).
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ReaderStats::default();
    }

    /// Message type expected in subsequent packets.
    pub fn type_id(&self) -> MessageTypeId {
        self.type_id
    }

    /// Expect a different message type from the next packet on.
    pub fn set_type_id(&mut self, type_id: MessageTypeId) {
        self.type_id = type_id;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Bytes received but not yet consumed by a packet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read + TimeoutStream> PacketReader<T> {
    /// Create a packet reader and apply the read timeout from config.
    pub fn with_config_timeout(
        inner: T,
        schema: Arc<Schema>,
        type_id: MessageTypeId,
        config: FrameConfig,
    ) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, schema, type_id, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bcnp_schema::Record;
    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_packet, HEADER_SIZE};
    use crate::flags::Flags;
    use crate::writer::PacketWriter;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::builtin())
    }

    fn drive(vx: f64, omega: f64, ms: u16) -> Record {
        Record::new(vec![vx.into(), omega.into(), ms.into()])
    }

    fn wire(records: &[Record], flags: Flags) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_packet(&Schema::builtin(), MessageTypeId::DRIVE_CMD, records, flags, &mut buf).unwrap();
        buf
    }

    #[test]
    fn read_single_packet() {
        let bytes = wire(&[drive(1.0, 0.0, 1000)], Flags::CLEAR_QUEUE);
        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()), schema(), MessageTypeId::DRIVE_CMD);

        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.records, vec![drive(1.0, 0.0, 1000)]);
        assert!(packet.flags().clear_queue());
        assert_eq!(reader.stats().packets, 1);
    }

    #[test]
    fn read_multiple_packets() {
        let mut bytes = wire(&[drive(1.0, 0.0, 1)], Flags::NONE);
        bytes.extend_from_slice(&wire(&[drive(0.0, 1.0, 2), drive(0.0, 0.0, 3)], Flags::NONE));
        bytes.extend_from_slice(&wire(&[], Flags::CLEAR_QUEUE));

        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()), schema(), MessageTypeId::DRIVE_CMD);
        assert_eq!(reader.read_packet().unwrap().len(), 1);
        assert_eq!(reader.read_packet().unwrap().len(), 2);
        assert!(reader.read_packet().unwrap().is_empty());
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[drive(0.5, -0.5, 50), drive(0.25, 0.0, 60)], Flags::NONE);
        let byte_reader = ByteByByteReader {
            bytes: bytes.to_vec(),
            pos: 0,
        };
        let mut reader = PacketReader::new(byte_reader, schema(), MessageTypeId::DRIVE_CMD);

        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.len(), 2);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = PacketReader::new(Cursor::new(Vec::<u8>::new()), schema(), MessageTypeId::DRIVE_CMD);
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn connection_closed_mid_packet() {
        let bytes = wire(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        let partial = bytes[..bytes.len() - 3].to_vec();
        let mut reader = PacketReader::new(Cursor::new(partial), schema(), MessageTypeId::DRIVE_CMD);
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn corrupt_packet_is_skipped_and_counted() {
        let mut bytes = wire(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        bytes[HEADER_SIZE + 2] ^= 0x01;
        bytes.extend_from_slice(&wire(&[drive(0.5, 0.0, 10)], Flags::NONE));
        bytes.extend_from_slice(&wire(&[drive(0.5, 0.0, 20)], Flags::NONE));

        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()), schema(), MessageTypeId::DRIVE_CMD);
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::Decode(DecodeError::ChecksumMismatch { .. })
        ));
        assert_eq!(
            reader.stats(),
            ReaderStats {
                packets: 0,
                errors: 1,
                consecutive_errors: 1
            }
        );

        assert_eq!(reader.read_packet().unwrap().records, vec![drive(0.5, 0.0, 10)]);
        assert_eq!(reader.read_packet().unwrap().records, vec![drive(0.5, 0.0, 20)]);
        assert_eq!(
            reader.stats(),
            ReaderStats {
                packets: 2,
                errors: 1,
                consecutive_errors: 0
            }
        );

        reader.reset_stats();
        assert_eq!(reader.stats(), ReaderStats::default());
    }

    #[test]
    fn oversized_packet_rejected() {
        let mut bytes = BytesMut::new();
        PacketHeader::new(bcnp_schema::ProtocolVersion::CURRENT, Flags::NONE, 1000).encode(&mut bytes);
        bytes.put_slice(&[0u8; 32]);

        let cfg = FrameConfig {
            max_records_per_packet: 16,
            ..FrameConfig::default()
        };
        let mut reader = PacketReader::with_config(
            Cursor::new(bytes.to_vec()),
            schema(),
            MessageTypeId::DRIVE_CMD,
            cfg,
        );
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::PacketTooLarge {
                count: 1000,
                max: 16
            }
        ));
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.stats().errors, 1);
    }

    #[test]
    fn unknown_type_id_consumes_nothing() {
        let bytes = wire(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()), schema(), MessageTypeId(42));
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::Decode(DecodeError::UnknownMessageType(MessageTypeId(42)))
        ));

        reader.set_type_id(MessageTypeId::DRIVE_CMD);
        assert_eq!(reader.type_id(), MessageTypeId::DRIVE_CMD);
        assert_eq!(reader.read_packet().unwrap().len(), 1);
        assert_eq!(reader.stats().errors, 0);
    }

    #[test]
    fn raw_bytes_then_packets() {
        let mut bytes = BytesMut::from(&b"BCNP\x00\x00\x00\x01"[..]);
        bytes.extend_from_slice(&wire(&[drive(0.5, 0.0, 10)], Flags::NONE));
        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()), schema(), MessageTypeId::DRIVE_CMD);

        assert_eq!(reader.read_raw(4).unwrap().as_ref(), b"BCNP");
        assert_eq!(reader.read_raw(4).unwrap().as_ref(), &[0, 0, 0, 1]);
        assert!(reader.read_raw(0).unwrap().is_empty());
        assert_eq!(reader.read_packet().unwrap().records, vec![drive(0.5, 0.0, 10)]);
        assert!(matches!(
            reader.read_raw(8).unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        let reader = InterruptedThenData {
            interrupted: false,
            bytes: bytes.to_vec(),
            pos: 0,
        };
        let mut framed = PacketReader::new(reader, schema(), MessageTypeId::DRIVE_CMD);
        assert_eq!(framed.read_packet().unwrap().len(), 1);
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut framed = PacketReader::new(WouldBlockReader, schema(), MessageTypeId::DRIVE_CMD);
        let err = framed.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = PacketWriter::new(left, schema());
        let mut reader = PacketReader::new(right, schema(), MessageTypeId::DRIVE_CMD);

        writer
            .write_packet(MessageTypeId::DRIVE_CMD, &[drive(0.1, 0.2, 300)], Flags::NONE)
            .unwrap();
        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.records, vec![drive(0.1, 0.2, 300)]);
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = PacketWriter::new(left, schema());
        let mut reader = PacketReader::new(right, schema(), MessageTypeId::DRIVE_CMD);

        let reader_thread = std::thread::spawn(move || {
            for expected in 0..64u16 {
                let packet = reader.read_packet().unwrap();
                assert_eq!(packet.records, vec![drive(0.0, 0.0, expected)]);
            }
        });

        for i in 0..64u16 {
            writer
                .write_packet(MessageTypeId::DRIVE_CMD, &[drive(0.0, 0.0, i)], Flags::NONE)
                .unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn applies_read_timeout() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let mut reader =
            PacketReader::with_config_timeout(left, schema(), MessageTypeId::DRIVE_CMD, cfg).unwrap();
        // The kernel may round up to its clock tick.
        let applied = reader.get_ref().read_timeout().unwrap();
        assert!(applied >= Some(Duration::from_millis(10)));

        let err = reader.read_packet().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut
        ));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = PacketReader::new(Cursor::new(Vec::<u8>::new()), schema(), MessageTypeId::DRIVE_CMD);
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.schema().hash(), Schema::builtin().hash());
        assert_eq!(reader.config().max_records_per_packet, 65_535);
        let _inner = reader.into_inner();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
