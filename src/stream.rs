//! Positioned read view over a patch buffer, plus the target-buffer write
//! helpers every decoder shares.

use crate::error::{PatchError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// A cursor over a borrowed buffer. Several streams may view the same buffer
/// at once; none of them own it.
#[derive(Clone, Debug)]
pub struct PatchStream<'a> {
    data: &'a [u8],
    offset: usize,
    endian: Endian,
}

impl<'a> PatchStream<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            offset: 0,
            endian,
        }
    }

    pub fn at(data: &'a [u8], offset: usize, endian: Endian) -> Self {
        Self {
            data,
            offset,
            endian,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.offset = self
            .offset
            .checked_add(count)
            .ok_or_else(|| PatchError::overflow("stream offset"))?;
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Returns the next `count` bytes without copying and advances past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.offset += count;
        Ok(bytes)
    }

    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        self.offset
            .checked_add(count)
            .and_then(|end| self.data.get(self.offset..end))
            .ok_or(PatchError::ReadOutOfBounds(
                count,
                self.offset,
                self.data.len(),
            ))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_array()?;
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(b),
            Endian::Little => u16::from_le_bytes(b),
        })
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(match self.endian {
            Endian::Big => (u32::from(self.read_u16()?) << 8) | u32::from(self.read_u8()?),
            Endian::Little => u32::from(self.read_u16()?) | (u32::from(self.read_u8()?) << 16),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_array()?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let a = u64::from(self.read_u32()?);
        let b = u64::from(self.read_u32()?);
        Ok(match self.endian {
            Endian::Big => (a << 32) | b,
            Endian::Little => (b << 32) | a,
        })
    }
}

/// Reads the UPS/BPS number encoding: little-endian 7-bit groups, the high
/// bit marks the final byte, and every continued group adds the next power of
/// 128 on top of its digit.
pub fn read_biased_number(stream: &mut PatchStream) -> Result<u64> {
    let mut num: u64 = 0;
    let mut shift: u64 = 1;

    loop {
        let x = stream.read_u8()?;
        num = u64::from(x & 0x7f)
            .checked_mul(shift)
            .and_then(|digit| num.checked_add(digit))
            .ok_or_else(|| PatchError::overflow("variable-length number"))?;

        if x & 0x80 != 0 {
            break;
        }

        shift = shift
            .checked_mul(0x80)
            .ok_or_else(|| PatchError::overflow("variable-length number"))?;
        num = num
            .checked_add(shift)
            .ok_or_else(|| PatchError::overflow("variable-length number"))?;
    }

    Ok(num)
}

pub fn read_biased_usize(stream: &mut PatchStream) -> Result<usize> {
    to_usize(read_biased_number(stream)?)
}

pub(crate) fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| PatchError::overflow("size"))
}

/// Swaps every 16-bit pair in place. A trailing odd byte is left alone.
pub fn byteswap(data: &mut [u8]) {
    for pair in data.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

pub(crate) fn write_at(target: &mut [u8], offset: usize, bytes: &[u8]) -> Result<()> {
    let len = target.len();
    offset
        .checked_add(bytes.len())
        .and_then(|end| target.get_mut(offset..end))
        .ok_or(PatchError::WriteOutOfBounds(bytes.len(), offset, len))?
        .copy_from_slice(bytes);
    Ok(())
}

pub(crate) fn fill_at(target: &mut [u8], offset: usize, count: usize, byte: u8) -> Result<()> {
    let len = target.len();
    offset
        .checked_add(count)
        .and_then(|end| target.get_mut(offset..end))
        .ok_or(PatchError::WriteOutOfBounds(count, offset, len))?
        .fill(byte);
    Ok(())
}

/// An empty buffer able to hold `size` bytes; a size the allocator refuses is
/// a decode error.
pub(crate) fn reserve(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| {
        PatchError::GenericDecode(format!("cannot allocate {size:#x} byte target"))
    })?;
    Ok(buf)
}

pub(crate) fn zeroed(size: usize) -> Result<Vec<u8>> {
    let mut buf = reserve(size)?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Allocates a zeroed target of `size` bytes and copies as much of `source`
/// into its start as fits.
pub(crate) fn target_from_source(source: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut target = zeroed(size)?;
    let n = source.len().min(size);
    target[..n].copy_from_slice(&source[..n]);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads_follow_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

        let mut be = PatchStream::new(&data, Endian::Big);
        assert_eq!(be.read_u16().unwrap(), 0x0102);
        assert_eq!(be.read_u24().unwrap(), 0x030405);
        assert_eq!(be.offset(), 5);

        let mut le = PatchStream::new(&data, Endian::Little);
        assert_eq!(le.read_u24().unwrap(), 0x030201);
        le.seek(0);
        assert_eq!(le.read_u32().unwrap(), 0x04030201);
        le.seek(0);
        assert_eq!(le.read_u64().unwrap(), 0x0807060504030201);
        assert!(le.is_eof());

        be.seek(0);
        assert_eq!(be.read_u64().unwrap(), 0x0102030405060708);
    }

    #[test]
    fn reads_past_end_are_errors() {
        let data = [0xaa, 0xbb, 0xcc];
        let mut s = PatchStream::new(&data, Endian::Big);
        s.skip(2).unwrap();
        assert_eq!(s.read_u16(), Err(PatchError::ReadOutOfBounds(2, 2, 3)));
        // a failed read does not move the cursor
        assert_eq!(s.offset(), 2);
        assert_eq!(s.read_bytes(1).unwrap(), &[0xcc]);
        assert!(s.is_eof());
    }

    #[test]
    fn biased_number() {
        let cases: [(&[u8], u64); 5] = [
            (&[0x80], 0),
            (&[0xff], 0x7f),
            (&[0x00, 0x80], 0x80),
            (&[0x7f, 0x80], 0xff),
            (&[0x00, 0x00, 0x80], 0x4080),
        ];

        for (bytes, expected) in cases {
            let mut s = PatchStream::new(bytes, Endian::Little);
            assert_eq!(read_biased_number(&mut s).unwrap(), expected, "{bytes:x?}");
            assert!(s.is_eof());
        }
    }

    #[test]
    fn unterminated_biased_number() {
        let mut s = PatchStream::new(&[0x01, 0x02], Endian::Little);
        assert!(matches!(
            read_biased_number(&mut s),
            Err(PatchError::ReadOutOfBounds(..))
        ));
    }

    #[test]
    fn writes_are_bounds_checked() {
        let mut target = [0u8; 4];
        write_at(&mut target, 1, &[1, 2, 3]).unwrap();
        assert_eq!(target, [0, 1, 2, 3]);
        assert_eq!(
            write_at(&mut target, 2, &[9, 9, 9]),
            Err(PatchError::WriteOutOfBounds(3, 2, 4))
        );
        assert_eq!(
            fill_at(&mut target, usize::MAX, 2, 0),
            Err(PatchError::WriteOutOfBounds(2, usize::MAX, 4))
        );
        assert_eq!(target, [0, 1, 2, 3]);
    }

    #[test]
    fn oversized_targets_are_errors() {
        assert!(matches!(
            target_from_source(&[1, 2], usize::MAX),
            Err(PatchError::GenericDecode(_))
        ));
        assert!(matches!(reserve(usize::MAX), Err(PatchError::GenericDecode(_))));
        assert_eq!(target_from_source(&[1, 2, 3], 2).unwrap(), [1, 2]);
        assert_eq!(zeroed(3).unwrap(), [0, 0, 0]);
    }

    #[test]
    fn swap_pairs() {
        let mut data = [1, 2, 3, 4, 5];
        byteswap(&mut data);
        assert_eq!(data, [2, 1, 4, 3, 5]);
    }
}
