use log::debug;

use crate::{
    checksum::crc32,
    error::{PatchError, Result},
    progress::Progress,
    stream::{read_biased_usize, target_from_source, Endian, PatchStream},
};

const TRAILER_LEN: usize = 12;

/// The three little-endian CRC32 values that close a UPS or BPS patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checksums {
    pub source: u32,
    pub target: u32,
    pub patch: u32,
}

impl Checksums {
    /// Reads the trailer and returns it with the offset where it begins.
    pub fn read(patch: &[u8]) -> Result<(Self, usize)> {
        let offset = patch
            .len()
            .checked_sub(TRAILER_LEN)
            .ok_or(PatchError::ReadOutOfBounds(TRAILER_LEN, 0, patch.len()))?;

        let mut trailer = PatchStream::at(patch, offset, Endian::Little);
        let checksums = Self {
            source: trailer.read_u32()?,
            target: trailer.read_u32()?,
            patch: trailer.read_u32()?,
        };

        Ok((checksums, offset))
    }

    /// The patch checksum covers everything but its own four bytes.
    pub fn verify_inputs(&self, source: &[u8], patch: &[u8]) -> Result<()> {
        if crc32(source) != self.source {
            return Err(PatchError::SourceChecksumMismatch);
        }

        if crc32(&patch[..patch.len() - 4]) != self.patch {
            return Err(PatchError::PatchChecksumMismatch);
        }

        Ok(())
    }

    pub fn verify_target(&self, target: &[u8]) -> Result<()> {
        if crc32(target) != self.target {
            return Err(PatchError::TargetChecksumMismatch);
        }

        Ok(())
    }
}

pub(crate) fn apply(
    source: &[u8],
    patch: &[u8],
    verify_checksums: bool,
    progress: &mut Progress,
) -> Result<Vec<u8>> {
    let (checksums, checksum_offset) = Checksums::read(patch)?;

    if verify_checksums {
        checksums.verify_inputs(source, patch)?;
    }

    let mut stream = PatchStream::at(patch, 4, Endian::Little);
    let input_size = read_biased_usize(&mut stream)?;
    let output_size = read_biased_usize(&mut stream)?;
    debug!("ups: input size {input_size:#x}, output size {output_size:#x}");

    let mut target = target_from_source(source, output_size)?;
    let mut target_offset = 0usize;

    while stream.offset() < checksum_offset {
        target_offset = target_offset
            .checked_add(read_biased_usize(&mut stream)?)
            .ok_or_else(|| PatchError::overflow("ups target offset"))?;

        loop {
            let x = stream.read_u8()?;
            if x == 0 {
                break;
            }

            let len = target.len();
            *target
                .get_mut(target_offset)
                .ok_or(PatchError::WriteOutOfBounds(1, target_offset, len))? ^= x;
            target_offset += 1;
        }
        target_offset = target_offset
            .checked_add(1)
            .ok_or_else(|| PatchError::overflow("ups target offset"))?;

        progress.update(stream.offset(), patch.len());
    }

    if verify_checksums {
        checksums.verify_target(&target)?;
    }

    Ok(target)
}
