mod cache;
mod decode;
mod insts;

pub use decode::target_size;
pub(crate) use decode::apply;

use crate::{
    error::{PatchError, Result},
    stream::{to_usize, PatchStream},
};

/// RFC 3284 integer: big-endian 7-bit groups, high bit set on every byte
/// but the last.
pub fn read_number(stream: &mut PatchStream) -> Result<u64> {
    let mut result: u64 = 0;

    loop {
        let byte = stream.read_u8()?;
        if result >> 57 != 0 {
            return Err(PatchError::overflow("vcdiff integer"));
        }
        result = (result << 7) | u64::from(byte & 0x7f);

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(result)
}

pub(crate) fn read_usize(stream: &mut PatchStream) -> Result<usize> {
    to_usize(read_number(stream)?)
}
