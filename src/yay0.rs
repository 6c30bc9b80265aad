//! Yay0, the LZ-style compression Nintendo used on N64 titles.
//!
//! The header holds the decompressed size and the offsets of the 16-bit
//! back-reference stream and the raw byte stream; the 32-bit flag words start
//! right after the header.

use crate::{
    error::{PatchError, Result},
    stream::{reserve, Endian, PatchStream},
};

pub const MAGIC: &[u8] = b"Yay0";

const FLAGS_START: usize = 0x10;

pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut header = PatchStream::at(src, 4, Endian::Big);
    let size = header.read_u32()? as usize;
    let pair_start = header.read_u32()? as usize;
    let data_start = header.read_u32()? as usize;

    let mut flags = PatchStream::at(src, FLAGS_START, Endian::Big);
    let mut pairs = PatchStream::at(src, pair_start, Endian::Big);
    let mut data = PatchStream::at(src, data_start, Endian::Big);

    let mut dst = reserve(size)?;
    let mut bits = 0u32;
    let mut shift = 0;

    while dst.len() < size {
        if shift == 0 {
            bits = flags.read_u32()?;
            shift = 32;
        }

        if bits & 0x8000_0000 != 0 {
            dst.push(data.read_u8()?);
        } else {
            let pair = pairs.read_u16()?;
            let distance = (pair & 0x0fff) as usize + 1;
            let len = match pair >> 12 {
                0 => data.read_u8()? as usize + 18,
                n => n as usize + 2,
            };

            let start = dst
                .len()
                .checked_sub(distance)
                .ok_or(PatchError::ReadOutOfBounds(len, distance, dst.len()))?;
            if dst.len() + len > size {
                return Err(PatchError::WriteOutOfBounds(len, dst.len(), size));
            }

            // the copy may read bytes it has just written
            for i in start..start + len {
                dst.push(dst[i]);
            }
        }

        bits <<= 1;
        shift -= 1;
    }

    Ok(dst)
}
