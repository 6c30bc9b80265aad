//! Star Rod mod patches: a count followed by (offset, length, bytes) blocks,
//! optionally wrapped whole in Yay0.

use std::borrow::Cow;

use log::debug;

use crate::{
    error::{PatchError, Result},
    progress::Progress,
    stream::{target_from_source, write_at, Endian, PatchStream},
    yay0,
};

const RECORDS_START: usize = 8;

/// Unwraps a Yay0-compressed patch; anything else is returned as is.
fn records(patch: &[u8]) -> Result<Cow<'_, [u8]>> {
    if patch.starts_with(yay0::MAGIC) {
        let unpacked = yay0::decompress(patch)?;
        debug!("mod: yay0 {:#x} -> {:#x} bytes", patch.len(), unpacked.len());
        Ok(Cow::Owned(unpacked))
    } else {
        Ok(Cow::Borrowed(patch))
    }
}

fn read_count(patch: &mut PatchStream) -> Result<u32> {
    patch.seek(4);
    patch.read_u32()
}

fn read_block<'a>(patch: &mut PatchStream<'a>) -> Result<(usize, &'a [u8])> {
    let offset = patch.read_u32()? as usize;
    let len = patch.read_u32()? as usize;
    Ok((offset, patch.read_bytes(len)?))
}

/// First pass over an unwrapped record stream: the furthest byte any block
/// writes, never less than the source length.
pub fn target_size(source_len: usize, patch: &[u8]) -> Result<usize> {
    let mut patch = PatchStream::new(patch, Endian::Big);
    let count = read_count(&mut patch)?;
    let mut size = source_len;

    for _ in 0..count {
        let (offset, bytes) = read_block(&mut patch)?;
        let end = offset
            .checked_add(bytes.len())
            .ok_or_else(|| PatchError::overflow("mod block end"))?;
        size = size.max(end);
    }

    Ok(size)
}

pub(crate) fn apply(
    source: &[u8],
    patch: &[u8],
    _verify_checksums: bool,
    progress: &mut Progress,
) -> Result<Vec<u8>> {
    let patch = records(patch)?;
    let size = target_size(source.len(), &patch)?;

    let mut target = target_from_source(source, size)?;
    let mut stream = PatchStream::new(&patch, Endian::Big);
    let count = read_count(&mut stream)?;
    debug!("mod: {count} block(s), target size {size:#x}");
    stream.seek(RECORDS_START);

    for _ in 0..count {
        let (offset, bytes) = read_block(&mut stream)?;
        write_at(&mut target, offset, bytes)?;
        progress.update(stream.offset(), stream.len());
    }

    Ok(target)
}
