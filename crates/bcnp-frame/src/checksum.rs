//! CRC-32 (ISO-HDLC, the zlib polynomial) over packet bytes.

/// Size of the trailing checksum in bytes.
pub const CHECKSUM_SIZE: usize = 4;

pub fn compute(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

pub fn verify(bytes: &[u8], expected: u32) -> bool {
    compute(bytes) == expected
}
