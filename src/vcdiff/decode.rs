use log::debug;

use super::{
    cache::AddrCache,
    insts::{CodeTable, Instruction, Type, DEFAULT_CODE_TABLE},
    read_usize,
};
use crate::{
    checksum::adler32,
    error::{PatchError, Result},
    progress::Progress,
    stream::{fill_at, write_at, zeroed, Endian, PatchStream},
};

const VCD_DECOMPRESS: u8 = 1;
const VCD_CODETABLE: u8 = 2;
const VCD_APPHEADER: u8 = 4;

const VCD_SOURCE: u8 = 1;
const VCD_TARGET: u8 = 2;
const VCD_ADLER32: u8 = 4;

#[derive(Debug)]
struct FileHeader {
    secondary_id: u8,
    code_table_len: usize,
}

impl FileHeader {
    /// Parses the file header, leaving the stream at the first window.
    fn parse(patch: &mut PatchStream) -> Result<Self> {
        patch.skip(4)?;
        let indicator = patch.read_u8()?;

        let secondary_id = if indicator & VCD_DECOMPRESS != 0 {
            patch.read_u8()?
        } else {
            0
        };

        let code_table_len = if indicator & VCD_CODETABLE != 0 {
            read_usize(patch)?
        } else {
            0
        };

        if indicator & VCD_APPHEADER != 0 {
            let len = read_usize(patch)?;
            patch.skip(len)?;
        }

        if secondary_id != 0 {
            return Err(PatchError::Unimplemented("vcdiff secondary decompressor"));
        }

        if code_table_len != 0 {
            return Err(PatchError::Unimplemented("vcdiff custom code table"));
        }

        Ok(Self {
            secondary_id,
            code_table_len,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Segment {
    None,
    Source { len: usize, pos: usize },
    Target { len: usize, pos: usize },
}

impl Segment {
    fn len(self) -> usize {
        match self {
            Segment::None => 0,
            Segment::Source { len, .. } | Segment::Target { len, .. } => len,
        }
    }
}

#[derive(Debug)]
struct WindowHeader {
    segment: Segment,
    target_window_len: usize,
    data_len: usize,
    inst_len: usize,
    addr_len: usize,
    adler32: Option<u32>,
}

impl WindowHeader {
    fn parse(patch: &mut PatchStream) -> Result<Self> {
        let indicator = patch.read_u8()?;

        let segment = match indicator & (VCD_SOURCE | VCD_TARGET) {
            0 => Segment::None,
            VCD_SOURCE => Segment::Source {
                len: read_usize(patch)?,
                pos: read_usize(patch)?,
            },
            VCD_TARGET => Segment::Target {
                len: read_usize(patch)?,
                pos: read_usize(patch)?,
            },
            _ => {
                return Err(PatchError::GenericDecode(
                    "window sets both VCD_SOURCE and VCD_TARGET".to_string(),
                ))
            }
        };

        let delta_len = read_usize(patch)?;
        let start = patch.offset();

        let target_window_len = read_usize(patch)?;
        let delta_indicator = patch.read_u8()?;
        let data_len = read_usize(patch)?;
        let inst_len = read_usize(patch)?;
        let addr_len = read_usize(patch)?;

        let adler32 = if indicator & VCD_ADLER32 != 0 {
            Some(patch.read_u32()?)
        } else {
            None
        };

        if delta_indicator != 0 {
            return Err(PatchError::Unimplemented(
                "vcdiff secondary compression of window sections",
            ));
        }

        let header = Self {
            segment,
            target_window_len,
            data_len,
            inst_len,
            addr_len,
            adler32,
        };

        let encoded_len = header
            .sections_len()?
            .checked_add(patch.offset() - start)
            .ok_or_else(|| PatchError::overflow("vcdiff window length"))?;
        if encoded_len != delta_len {
            return Err(PatchError::GenericDecode(format!(
                "window delta length mismatch (declared: {delta_len}, actual: {encoded_len})"
            )));
        }

        Ok(header)
    }

    fn sections_len(&self) -> Result<usize> {
        self.data_len
            .checked_add(self.inst_len)
            .and_then(|n| n.checked_add(self.addr_len))
            .ok_or_else(|| PatchError::overflow("vcdiff section lengths"))
    }
}

/// First pass: sums the target window lengths without decoding any
/// instructions, then rewinds the stream to its start.
pub fn target_size(patch: &mut PatchStream) -> Result<usize> {
    FileHeader::parse(patch)?;
    let mut size = 0usize;

    while !patch.is_eof() {
        let window = WindowHeader::parse(patch)?;
        size = size
            .checked_add(window.target_window_len)
            .ok_or_else(|| PatchError::overflow("vcdiff target size"))?;
        patch.skip(window.sections_len()?)?;
    }

    patch.seek(0);
    Ok(size)
}

/// The three section cursors of one window.
struct Sections<'a> {
    data: PatchStream<'a>,
    inst: PatchStream<'a>,
    addr: PatchStream<'a>,
    inst_end: usize,
}

/// Where the window being decoded sits in the target.
#[derive(Clone, Copy)]
struct WindowBounds {
    segment: Segment,
    start: usize,
    end: usize,
}

pub(crate) struct VCDiffDecoder<'a> {
    patch: PatchStream<'a>,
    source: &'a [u8],
    output: Vec<u8>,
    code_table: &'static CodeTable,
    addr_cache: AddrCache,
}

impl<'a> VCDiffDecoder<'a> {
    pub(crate) fn new(patch: &'a [u8], source: &'a [u8]) -> Self {
        VCDiffDecoder {
            patch: PatchStream::new(patch, Endian::Big),
            source,
            output: vec![],
            code_table: &DEFAULT_CODE_TABLE,
            addr_cache: AddrCache::default(),
        }
    }

    pub(crate) fn decode(
        mut self,
        verify_checksums: bool,
        progress: &mut Progress,
    ) -> Result<Vec<u8>> {
        let size = target_size(&mut self.patch)?;
        debug!("vcdiff: target size {size:#x}");
        self.output = zeroed(size)?;

        let header = FileHeader::parse(&mut self.patch)?;
        debug!(
            "vcdiff: secondary id {}, code table length {}",
            header.secondary_id, header.code_table_len
        );

        let mut window_start = 0;
        while !self.patch.is_eof() {
            let window = WindowHeader::parse(&mut self.patch)?;
            debug!("vcdiff: window at {window_start:#x}: {window:?}");

            self.decode_window(&window, window_start, progress)?;

            if verify_checksums {
                if let Some(expected) = window.adler32 {
                    let end = window_start + window.target_window_len;
                    if adler32(&self.output[window_start..end]) != expected {
                        return Err(PatchError::TargetChecksumMismatch);
                    }
                }
            }

            window_start += window.target_window_len;
        }

        Ok(self.output)
    }

    fn decode_window(
        &mut self,
        window: &WindowHeader,
        start: usize,
        progress: &mut Progress,
    ) -> Result<()> {
        let data_start = self.patch.offset();
        let sections_len = window.sections_len()?;
        self.patch.peek_bytes(sections_len)?;

        let inst_start = data_start + window.data_len;
        let addr_start = inst_start + window.inst_len;
        let bytes = self.patch.data();

        let mut sections = Sections {
            data: PatchStream::at(bytes, data_start, Endian::Big),
            inst: PatchStream::at(bytes, inst_start, Endian::Big),
            addr: PatchStream::at(bytes, addr_start, Endian::Big),
            inst_end: addr_start,
        };

        let bounds = WindowBounds {
            segment: window.segment,
            start,
            end: start + window.target_window_len,
        };

        // a target segment may only reference windows already decoded
        let (len, pos, limit) = match window.segment {
            Segment::None => (0, 0, 0),
            Segment::Source { len, pos } => (len, pos, self.source.len()),
            Segment::Target { len, pos } => (len, pos, start),
        };
        if pos.checked_add(len).map_or(true, |end| end > limit) {
            return Err(PatchError::ReadOutOfBounds(len, pos, limit));
        }

        self.addr_cache.reset();
        let mut offset = 0;

        while sections.inst.offset() < sections.inst_end {
            let code = sections.inst.read_u8()?;
            let (first, second) = self.code_table[code as usize];

            self.decode_instruction(first, &mut sections, bounds, &mut offset)?;
            if let Some(second) = second {
                self.decode_instruction(second, &mut sections, bounds, &mut offset)?;
            }

            progress.update(start + offset, self.output.len());
        }

        if offset != window.target_window_len {
            return Err(PatchError::GenericDecode(format!(
                "window produced {offset} byte(s), expected {}",
                window.target_window_len
            )));
        }

        self.patch.skip(sections_len)
    }

    fn decode_instruction(
        &mut self,
        inst: Instruction,
        sections: &mut Sections,
        bounds: WindowBounds,
        offset: &mut usize,
    ) -> Result<()> {
        let size = if inst.size == 0 {
            read_usize(&mut sections.inst)?
        } else {
            inst.size as usize
        };

        let pos = bounds.start + *offset;
        if pos.checked_add(size).map_or(true, |end| end > bounds.end) {
            return Err(PatchError::WriteOutOfBounds(size, pos, bounds.end));
        }

        match inst.ty {
            Type::Add => {
                write_at(&mut self.output, pos, sections.data.read_bytes(size)?)?;
            }
            Type::Run => {
                let byte = sections.data.read_u8()?;
                fill_at(&mut self.output, pos, size, byte)?;
            }
            Type::Copy => {
                let segment_len = bounds.segment.len();
                let addr =
                    self.addr_cache
                        .decode(segment_len + *offset, inst.mode, &mut sections.addr)?;

                // byte by byte: a copy may read what it has just written
                for i in 0..size {
                    let a = addr
                        .checked_add(i)
                        .ok_or_else(|| PatchError::overflow("copy address"))?;
                    let byte = match bounds.segment {
                        Segment::Source { pos: base, len } if a < len => self.source[base + a],
                        Segment::Target { pos: base, len } if a < len => self.output[base + a],
                        _ => {
                            let from = (a - segment_len)
                                .checked_add(bounds.start)
                                .ok_or_else(|| PatchError::overflow("copy address"))?;
                            if from >= pos + i {
                                return Err(PatchError::ReadOutOfBounds(1, from, pos + i));
                            }
                            self.output[from]
                        }
                    };
                    self.output[pos + i] = byte;
                }
            }
        }

        *offset += size;
        Ok(())
    }
}

pub(crate) fn apply(
    source: &[u8],
    patch: &[u8],
    verify_checksums: bool,
    progress: &mut Progress,
) -> Result<Vec<u8>> {
    VCDiffDecoder::new(patch, source).decode(verify_checksums, progress)
}
