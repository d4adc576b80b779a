//! Packet framing for BCNP.
//!
//! Every packet carries a homogeneous batch of records:
//! - a 5-byte header (protocol major, minor, flags, big-endian record count)
//! - `count` fixed-size records laid out by the schema
//! - a big-endian CRC-32 over everything before it
//!
//! The codec functions are pure. [`PacketReader`] and [`PacketWriter`] add
//! blocking I/O over any `Read`/`Write` stream.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod flags;
pub mod reader;
pub mod stream;
pub mod writer;

pub use checksum::CHECKSUM_SIZE;
pub use codec::{
    decode_packet, decode_packet_from, encode_messages, encode_packet, packet_len, FrameConfig,
    Packet, PacketHeader, HEADER_SIZE, MAX_RECORDS_PER_PACKET,
};
pub use error::{DecodeError, EncodeError, FrameError, Result};
pub use flags::Flags;
pub use reader::{PacketReader, ReaderStats};
pub use stream::TimeoutStream;
pub use writer::PacketWriter;
