use log::{debug, trace};

use crate::{
    error::Result,
    progress::Progress,
    stream::{fill_at, target_from_source, write_at, Endian, PatchStream},
};

const RECORDS_START: usize = 5;
const EOF_MARKER: &[u8] = b"EOF";

#[derive(Debug, PartialEq, Eq)]
enum Data<'a> {
    Chunk(&'a [u8]),
    Run { len: usize, byte: u8 },
}

#[derive(Debug, PartialEq, Eq)]
struct Record<'a> {
    offset: usize,
    data: Data<'a>,
}

impl Record<'_> {
    fn end(&self) -> usize {
        self.offset
            + match self.data {
                Data::Chunk(bytes) => bytes.len(),
                Data::Run { len, .. } => len,
            }
    }
}

/// What follows the last record.
#[derive(Debug, PartialEq, Eq)]
enum Tail {
    None,
    Truncate(usize),
}

/// Returns the next record, or `None` once the stream is down to its
/// trailer. A trailing "EOF" marker may carry a 24-bit truncation size.
fn next_record<'a>(patch: &mut PatchStream<'a>, tail: &mut Tail) -> Result<Option<Record<'a>>> {
    let remaining = patch.remaining();
    if remaining <= 3 {
        return Ok(None);
    }

    if remaining == 6 && patch.peek_bytes(3)? == EOF_MARKER {
        patch.skip(3)?;
        *tail = Tail::Truncate(patch.read_u24()? as usize);
        return Ok(None);
    }

    let offset = patch.read_u24()? as usize;
    let len = patch.read_u16()? as usize;

    let data = if len != 0 {
        Data::Chunk(patch.read_bytes(len)?)
    } else {
        let len = patch.read_u16()? as usize;
        let byte = patch.read_u8()?;
        Data::Run { len, byte }
    };

    Ok(Some(Record { offset, data }))
}

fn scan(source_len: usize, patch: &[u8]) -> Result<(usize, Tail)> {
    let mut patch = PatchStream::at(patch, RECORDS_START, Endian::Big);
    let mut tail = Tail::None;
    let mut extent = source_len;

    while let Some(record) = next_record(&mut patch, &mut tail)? {
        extent = extent.max(record.end());
    }

    Ok((extent, tail))
}

/// First pass: the largest extent any record writes to, never less than the
/// source length, or the truncation size when the patch carries one.
pub fn target_size(source_len: usize, patch: &[u8]) -> Result<usize> {
    Ok(match scan(source_len, patch)? {
        (_, Tail::Truncate(len)) => len,
        (extent, Tail::None) => extent,
    })
}

pub(crate) fn apply(
    source: &[u8],
    patch: &[u8],
    _verify_checksums: bool,
    progress: &mut Progress,
) -> Result<Vec<u8>> {
    let (extent, tail) = scan(source.len(), patch)?;
    debug!("ips: record extent {extent:#x}, {tail:?}");

    let mut target = target_from_source(source, extent)?;
    let mut patch = PatchStream::at(patch, RECORDS_START, Endian::Big);
    let mut tail = Tail::None;

    while let Some(record) = next_record(&mut patch, &mut tail)? {
        match record.data {
            Data::Chunk(bytes) => write_at(&mut target, record.offset, bytes)?,
            Data::Run { len, byte } => {
                trace!("ips: run of {len} x {byte:#04x} at {:#x}", record.offset);
                fill_at(&mut target, record.offset, len, byte)?
            }
        }

        progress.update(patch.offset(), patch.len());
    }

    if let Tail::Truncate(len) = tail {
        target.resize(len, 0);
    }

    Ok(target)
}
