use std::time::Duration;

use bcnp_schema::{Message, MessageTypeId, ProtocolVersion, Record, RecordLayout, Schema};
use bytes::{Buf, BufMut, BytesMut};

use crate::checksum::{self, CHECKSUM_SIZE};
use crate::error::{DecodeError, EncodeError};
use crate::flags::Flags;

/// Packet header: major (1) + minor (1) + flags (1) + count (2) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// The 16-bit count field caps a batch at 65535 records.
pub const MAX_RECORDS_PER_PACKET: usize = u16::MAX as usize;

/// Fixed header at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: ProtocolVersion,
    pub flags: Flags,
    pub count: u16,
}

impl PacketHeader {
    pub fn new(version: ProtocolVersion, flags: Flags, count: u16) -> Self {
        Self {
            version,
            flags,
            count,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version.major);
        dst.put_u8(self.version.minor);
        dst.put_u8(self.flags.bits());
        dst.put_u16(self.count);
    }

    /// Parse the header from the front of `src`. `None` if fewer than
    /// [`HEADER_SIZE`] bytes are available.
    pub fn parse(src: &[u8]) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        let mut buf = &src[..HEADER_SIZE];
        let major = buf.get_u8();
        let minor = buf.get_u8();
        let flags = Flags::from_bits_retain(buf.get_u8());
        let count = buf.get_u16();
        Some(Self::new(ProtocolVersion::new(major, minor), flags, count))
    }

    /// Total packet length this header implies for records of `record_size`.
    pub fn packet_len(&self, record_size: usize) -> usize {
        packet_len(usize::from(self.count), record_size)
    }
}

/// Wire length of a packet holding `count` records of `record_size` bytes.
pub fn packet_len(count: usize, record_size: usize) -> usize {
    count
        .saturating_mul(record_size)
        .saturating_add(HEADER_SIZE + CHECKSUM_SIZE)
}

/// A decoded, checksum-verified packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    /// Supplied by the caller at decode time; not carried on the wire.
    pub type_id: MessageTypeId,
    pub records: Vec<Record>,
}

impl Packet {
    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    pub fn version(&self) -> ProtocolVersion {
        self.header.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Convert the records into typed messages.
    ///
    /// Fails with `UnknownMessageType` if the packet was decoded for a
    /// different type id than `M::TYPE_ID`.
    pub fn messages<M: Message>(&self) -> Result<Vec<M>, DecodeError> {
        if self.type_id != M::TYPE_ID {
            return Err(DecodeError::UnknownMessageType(self.type_id));
        }
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                M::from_record(record).map_err(|reason| DecodeError::InvalidRecord { index, reason })
            })
            .collect()
    }
}

/// Encode a homogeneous batch into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌───────┬───────┬───────┬────────────┬──────────────────────┬─────────────┐
/// │ Major │ Minor │ Flags │ Count      │ Records              │ CRC-32      │
/// │ (1B)  │ (1B)  │ (1B)  │ (2B BE)    │ (Count x size)       │ (4B BE)     │
/// └───────┴───────┴───────┴────────────┴──────────────────────┴─────────────┘
/// ```
///
/// Records are written in input order. On error `dst` is left as it was.
pub fn encode_packet(
    schema: &Schema,
    type_id: MessageTypeId,
    records: &[Record],
    flags: Flags,
    dst: &mut BytesMut,
) -> Result<(), EncodeError> {
    let layout = schema
        .layout(type_id)
        .map_err(|_| EncodeError::UnknownMessageType(type_id))?;
    let count = u16::try_from(records.len()).map_err(|_| EncodeError::BatchTooLarge {
        count: records.len(),
        max: MAX_RECORDS_PER_PACKET,
    })?;

    let start = dst.len();
    dst.reserve(packet_len(records.len(), layout.wire_size()));
    PacketHeader::new(schema.version(), flags, count).encode(dst);

    for (index, record) in records.iter().enumerate() {
        if let Err(err) = layout.encode_record(record, dst) {
            dst.truncate(start);
            return Err(EncodeError::from_record(index, err));
        }
    }

    let crc = checksum::compute(&dst[start..]);
    dst.put_u32(crc);
    Ok(())
}

/// Encode typed messages of one kind.
pub fn encode_messages<M: Message>(
    schema: &Schema,
    messages: &[M],
    flags: Flags,
    dst: &mut BytesMut,
) -> Result<(), EncodeError> {
    let records: Vec<Record> = messages.iter().map(Message::to_record).collect();
    encode_packet(schema, M::TYPE_ID, &records, flags, dst)
}

/// Decode exactly one packet of `type_id` records from `bytes`.
///
/// Checks run in a fixed order: layout lookup, header length, declared
/// length, checksum, protocol version, trailing bytes, then each record.
/// Records are only decoded once the checksum has been verified.
pub fn decode_packet(
    schema: &Schema,
    type_id: MessageTypeId,
    bytes: &[u8],
) -> Result<Packet, DecodeError> {
    let layout = schema
        .layout(type_id)
        .map_err(|_| DecodeError::UnknownMessageType(type_id))?;
    let header = PacketHeader::parse(bytes).ok_or(DecodeError::Truncated {
        needed: HEADER_SIZE,
        available: bytes.len(),
    })?;

    let total = header.packet_len(layout.wire_size());
    if bytes.len() < total {
        return Err(DecodeError::Truncated {
            needed: total,
            available: bytes.len(),
        });
    }

    let packet = &bytes[..total];
    verify_integrity(packet, &header, schema.version())?;
    if bytes.len() > total {
        return Err(DecodeError::TrailingBytes {
            extra: bytes.len() - total,
        });
    }

    let records = decode_records(layout, packet)?;
    Ok(Packet {
        header,
        type_id,
        records,
    })
}

/// Decode a packet from the front of a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete packet yet.
/// Once a whole packet is buffered its bytes are consumed, whether it
/// decodes or is rejected, so the next call starts at the following packet.
/// An unknown type id consumes nothing.
pub fn decode_packet_from(
    schema: &Schema,
    type_id: MessageTypeId,
    src: &mut BytesMut,
) -> Result<Option<Packet>, DecodeError> {
    let layout = schema
        .layout(type_id)
        .map_err(|_| DecodeError::UnknownMessageType(type_id))?;
    let Some(header) = PacketHeader::parse(src) else {
        return Ok(None);
    };

    let total = header.packet_len(layout.wire_size());
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    let packet = src.split_to(total);
    verify_integrity(&packet, &header, schema.version())?;
    let records = decode_records(layout, &packet)?;
    Ok(Some(Packet {
        header,
        type_id,
        records,
    }))
}

fn verify_integrity(
    packet: &[u8],
    header: &PacketHeader,
    expected: ProtocolVersion,
) -> Result<(), DecodeError> {
    let (body, mut trailer) = packet.split_at(packet.len() - CHECKSUM_SIZE);
    let carried = trailer.get_u32();
    let computed = checksum::compute(body);
    if carried != computed {
        return Err(DecodeError::ChecksumMismatch { carried, computed });
    }

    if header.version != expected {
        return Err(DecodeError::UnsupportedVersion {
            found: header.version,
            expected,
        });
    }
    Ok(())
}

fn decode_records(layout: &RecordLayout, packet: &[u8]) -> Result<Vec<Record>, DecodeError> {
    let body = &packet[HEADER_SIZE..packet.len() - CHECKSUM_SIZE];
    if layout.wire_size() == 0 {
        return Ok(Vec::new());
    }
    body.chunks_exact(layout.wire_size())
        .enumerate()
        .map(|(index, chunk)| {
            layout
                .decode_record(chunk)
                .map_err(|reason| DecodeError::InvalidRecord { index, reason })
        })
        .collect()
}

/// Configuration for the packet reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest batch accepted or produced. Default: 65535.
    pub max_records_per_packet: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_records_per_packet: MAX_RECORDS_PER_PACKET,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use bcnp_schema::{DriveCmd, FieldType, FieldValue, MessageDescriptor, RecordError, SchemaDescription};

    use super::*;

    fn drive(vx: f64, omega: f64, ms: u16) -> Record {
        Record::new(vec![vx.into(), omega.into(), ms.into()])
    }

    fn encode(records: &[Record], flags: Flags) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_packet(&Schema::builtin(), MessageTypeId::DRIVE_CMD, records, flags, &mut buf).unwrap();
        buf
    }

    #[test]
    fn encode_decode_roundtrip() {
        let schema = Schema::builtin();
        let records = vec![drive(1.0, 0.0, 1000), drive(-0.25, 0.75, 20)];
        let buf = encode(&records, Flags::CLEAR_QUEUE);
        assert_eq!(buf.len(), packet_len(2, 10));

        let packet = decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf).unwrap();
        assert_eq!(packet.flags(), Flags::CLEAR_QUEUE);
        assert_eq!(packet.version(), ProtocolVersion::CURRENT);
        assert_eq!(packet.records, records);
    }

    #[test]
    fn header_layout() {
        let buf = encode(&[drive(1.0, 0.0, 1000)], Flags::from_bits_retain(0x81));
        assert_eq!(&buf[..HEADER_SIZE], &[0x02, 0x04, 0x81, 0x00, 0x01]);
        assert_eq!(&buf[HEADER_SIZE..HEADER_SIZE + 4], &[0x00, 0x00, 0x27, 0x10]);
        let crc = checksum::compute(&buf[..buf.len() - 4]);
        assert_eq!(&buf[buf.len() - 4..], &crc.to_be_bytes());
    }

    #[test]
    fn empty_batch() {
        let schema = Schema::builtin();
        let buf = encode(&[], Flags::NONE);
        assert_eq!(buf.len(), HEADER_SIZE + CHECKSUM_SIZE);
        let packet = decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf).unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn batch_too_large() {
        let records = vec![drive(0.0, 0.0, 0); MAX_RECORDS_PER_PACKET + 1];
        let mut buf = BytesMut::new();
        let err = encode_packet(
            &Schema::builtin(),
            MessageTypeId::DRIVE_CMD,
            &records,
            Flags::NONE,
            &mut buf,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EncodeError::BatchTooLarge {
                count: 65_536,
                max: 65_535
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn max_batch_fits() {
        let records = vec![drive(0.0, 0.0, 0); MAX_RECORDS_PER_PACKET];
        let buf = encode(&records, Flags::NONE);
        assert_eq!(&buf[3..5], &[0xFF, 0xFF]);
        assert_eq!(buf.len(), packet_len(MAX_RECORDS_PER_PACKET, 10));
    }

    #[test]
    fn encode_failure_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        let records = vec![drive(0.5, 0.0, 1), drive(1.0e9, 0.0, 1)];
        let err = encode_packet(
            &Schema::builtin(),
            MessageTypeId::DRIVE_CMD,
            &records,
            Flags::NONE,
            &mut buf,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EncodeError::NumericOverflow {
                index: 1,
                field: "vx".to_string()
            }
        );
        assert_eq!(buf.as_ref(), b"prefix");
    }

    #[test]
    fn encode_rejects_malformed_records() {
        let mut buf = BytesMut::new();
        let err = encode_packet(
            &Schema::builtin(),
            MessageTypeId::DRIVE_CMD,
            &[Record::new(vec![FieldValue::Float(1.0)])],
            Flags::NONE,
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::InvalidRecord {
                index: 0,
                reason: RecordError::FieldCount { .. }
            }
        ));

        let err = encode_packet(
            &Schema::builtin(),
            MessageTypeId(5),
            &[],
            Flags::NONE,
            &mut buf,
        )
        .unwrap_err();
        assert_eq!(err, EncodeError::UnknownMessageType(MessageTypeId(5)));
    }

    #[test]
    fn decode_unknown_type_checked_first() {
        let err = decode_packet(&Schema::builtin(), MessageTypeId(9), &[]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownMessageType(MessageTypeId(9)));
    }

    #[test]
    fn decode_truncated() {
        let schema = Schema::builtin();
        let buf = encode(&[drive(1.0, 0.0, 1000)], Flags::NONE);

        assert_eq!(
            decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf[..3]).unwrap_err(),
            DecodeError::Truncated {
                needed: HEADER_SIZE,
                available: 3
            }
        );
        assert_eq!(
            decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf[..buf.len() - 1]).unwrap_err(),
            DecodeError::Truncated {
                needed: buf.len(),
                available: buf.len() - 1
            }
        );
    }

    #[test]
    fn decode_checksum_mismatch() {
        let schema = Schema::builtin();
        let mut buf = encode(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        buf[HEADER_SIZE + 1] ^= 0x10;
        assert!(matches!(
            decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decode_unsupported_version() {
        let schema = Schema::builtin();
        let mut buf = encode(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        buf[1] = 5;
        let len = buf.len();
        let crc = checksum::compute(&buf[..len - 4]);
        buf[len - 4..].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(
            decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf).unwrap_err(),
            DecodeError::UnsupportedVersion {
                found: ProtocolVersion::new(2, 5),
                expected: ProtocolVersion::CURRENT
            }
        );
    }

    #[test]
    fn decode_trailing_bytes() {
        let schema = Schema::builtin();
        let mut buf = encode(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        buf.put_u8(0);
        assert_eq!(
            decode_packet(&schema, MessageTypeId::DRIVE_CMD, &buf).unwrap_err(),
            DecodeError::TrailingBytes { extra: 1 }
        );
    }

    #[test]
    fn decode_stops_at_first_invalid_record() {
        let description = SchemaDescription::builtin()
            .with_message(MessageDescriptor::new(2u16, "Toggle").field("on", FieldType::Bool));
        let schema = Schema::compile(description).unwrap();
        let id = MessageTypeId(2);

        let mut buf = BytesMut::new();
        PacketHeader::new(ProtocolVersion::CURRENT, Flags::NONE, 3).encode(&mut buf);
        buf.put_slice(&[1, 7, 9]);
        let crc = checksum::compute(&buf);
        buf.put_u32(crc);

        let err = decode_packet(&schema, id, &buf).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidRecord {
                index: 1,
                reason: RecordError::InvalidBool { raw: 7, .. }
            }
        ));
    }

    #[test]
    fn streaming_decode_waits_for_whole_packet() {
        let schema = Schema::builtin();
        let wire = encode(&[drive(1.0, 0.0, 1000), drive(0.0, 1.0, 5)], Flags::NONE);

        let mut buf = BytesMut::new();
        for &byte in &wire[..wire.len() - 1] {
            buf.put_u8(byte);
            assert!(decode_packet_from(&schema, MessageTypeId::DRIVE_CMD, &mut buf)
                .unwrap()
                .is_none());
        }
        buf.put_u8(wire[wire.len() - 1]);
        let packet = decode_packet_from(&schema, MessageTypeId::DRIVE_CMD, &mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(packet.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn streaming_decode_skips_corrupt_packet() {
        let schema = Schema::builtin();
        let mut buf = encode(&[drive(1.0, 0.0, 1000)], Flags::NONE);
        buf[HEADER_SIZE] ^= 0xFF;
        buf.extend_from_slice(&encode(&[drive(0.5, 0.0, 10)], Flags::CLEAR_QUEUE));

        assert!(matches!(
            decode_packet_from(&schema, MessageTypeId::DRIVE_CMD, &mut buf),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
        let next = decode_packet_from(&schema, MessageTypeId::DRIVE_CMD, &mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(next.flags(), Flags::CLEAR_QUEUE);
        assert!(buf.is_empty());
    }

    #[test]
    fn typed_messages() {
        let schema = Schema::builtin();
        let cmds = vec![DriveCmd::new(1.0, -0.5, 1000), DriveCmd::new(0.25, 0.0, 0)];
        let mut buf = BytesMut::new();
        encode_messages(&schema, &cmds, Flags::NONE, &mut buf).unwrap();

        let packet = decode_packet(&schema, DriveCmd::TYPE_ID, &buf).unwrap();
        assert_eq!(packet.messages::<DriveCmd>().unwrap(), cmds);
    }

    #[test]
    fn typed_messages_reject_other_type() {
        let packet = Packet {
            header: PacketHeader::new(ProtocolVersion::CURRENT, Flags::NONE, 0),
            type_id: MessageTypeId(3),
            records: Vec::new(),
        };
        assert_eq!(
            packet.messages::<DriveCmd>().unwrap_err(),
            DecodeError::UnknownMessageType(MessageTypeId(3))
        );
    }
}
