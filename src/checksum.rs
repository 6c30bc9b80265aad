use adler32::RollingAdler32;
use crc::{Crc, CRC_32_ISO_HDLC};

/// Reflected CRC-32 with polynomial 0xEDB88320, as used by UPS and BPS.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

pub fn adler32(data: &[u8]) -> u32 {
    RollingAdler32::from_buffer(data).hash()
}
