use log::debug;

use crate::{
    error::{PatchError, Result},
    progress::Progress,
    stream::{to_usize, write_at, Endian, PatchStream},
};

const VERSION_OFFSET: usize = 3;
const DESCRIPTION_LEN: usize = 0x32;
const BLOCK_CHECK_LEN: usize = 0x400;
const FILE_ID_MARKER: &[u8] = b"@BEGIN_FILE_ID.DIZ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Version {
    V1,
    V2,
    V3,
}

impl Version {
    fn parse(hi: u8, lo: u8) -> Result<Self> {
        match (hi.wrapping_sub(b'0'), lo.wrapping_sub(b'0')) {
            (1, 0) => Ok(Self::V1),
            (2, 0) => Ok(Self::V2),
            (3, 0) => Ok(Self::V3),
            _ => Err(PatchError::UnhandledFormatVersion(format!(
                "ppf {}.{}",
                hi as char, lo as char
            ))),
        }
    }

    fn read_address(self, patch: &mut PatchStream) -> Result<usize> {
        match self {
            Self::V3 => to_usize(patch.read_u64()?),
            Self::V1 | Self::V2 => Ok(patch.read_u32()? as usize),
        }
    }
}

#[derive(Debug, Default)]
struct Header {
    image_type: u8,
    original_len: u32,
    block_check: bool,
    undo_data: bool,
}

impl Header {
    fn parse(patch: &mut PatchStream, version: Version) -> Result<Self> {
        let mut header = Self::default();

        match version {
            Version::V3 => {
                header.image_type = patch.read_u8()?;
                header.block_check = patch.read_u8()? != 0;
                header.undo_data = patch.read_u8()? != 0;
                patch.skip(1)?;
            }
            Version::V2 => {
                header.original_len = patch.read_u32()?;
                header.block_check = true;
            }
            Version::V1 => (),
        }

        Ok(header)
    }
}

pub(crate) fn apply(
    source: &[u8],
    patch: &[u8],
    _verify_checksums: bool,
    progress: &mut Progress,
) -> Result<Vec<u8>> {
    let mut target = source.to_vec();
    let mut patch = PatchStream::at(patch, VERSION_OFFSET, Endian::Little);

    let version = Version::parse(patch.read_u8()?, patch.read_u8()?)?;
    patch.skip(1 + DESCRIPTION_LEN)?;

    let header = Header::parse(&mut patch, version)?;
    debug!(
        "ppf: {version:?}, image type {}, original length {:#x}, block check {}, undo data {}",
        header.image_type, header.original_len, header.block_check, header.undo_data
    );

    if header.block_check {
        patch.skip(BLOCK_CHECK_LEN)?;
    }

    while !patch.is_eof() {
        if patch.remaining() >= FILE_ID_MARKER.len()
            && patch.peek_bytes(FILE_ID_MARKER.len())? == FILE_ID_MARKER
        {
            break;
        }

        let offset = version.read_address(&mut patch)?;
        let len = patch.read_u8()? as usize;
        write_at(&mut target, offset, patch.read_bytes(len)?)?;

        if header.undo_data {
            patch.skip(len)?;
        }

        progress.update(patch.offset(), patch.len());
    }

    Ok(target)
}
