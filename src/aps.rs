use log::{debug, trace};

use crate::{
    error::{PatchError, Result},
    progress::Progress,
    stream::{byteswap, fill_at, target_from_source, write_at, Endian, PatchStream},
};

const MODE_SIMPLE: u8 = 0;
const MODE_N64: u8 = 1;

const ENC_SIMPLE: u8 = 0;

const N64_FMT_V64: u8 = 0;

const DESCRIPTION_LEN: usize = 0x32;
const ROM_HEADER_LEN: usize = 0x40;

#[derive(Debug, PartialEq, Eq)]
struct N64Header {
    file_format: u8,
    cart_id: u16,
    country_code: u8,
    crc1: u32,
    crc2: u32,
}

impl N64Header {
    fn parse(patch: &mut PatchStream) -> Result<Self> {
        let file_format = patch.read_u8()?;

        patch.set_endian(Endian::Big);
        let cart_id = patch.read_u16()?;
        let country_code = patch.read_u8()?;
        let crc1 = patch.read_u32()?;
        let crc2 = patch.read_u32()?;
        patch.set_endian(Endian::Little);

        Ok(Self {
            file_format,
            cart_id,
            country_code,
            crc1,
            crc2,
        })
    }

    /// Reads the same fields out of an N64 rom header, undoing the V64
    /// halfword swap on a local copy when the patch says the rom is in that
    /// layout.
    fn from_rom(source: &[u8], file_format: u8) -> Result<Self> {
        let mut rom_header = [0; ROM_HEADER_LEN];
        rom_header.copy_from_slice(source.get(..ROM_HEADER_LEN).ok_or(
            PatchError::ReadOutOfBounds(ROM_HEADER_LEN, 0, source.len()),
        )?);

        if file_format == N64_FMT_V64 {
            byteswap(&mut rom_header);
        }

        let mut rom = PatchStream::new(&rom_header, Endian::Big);
        rom.seek(0x10);
        let crc1 = rom.read_u32()?;
        let crc2 = rom.read_u32()?;
        rom.seek(0x3c);
        let cart_id = rom.read_u16()?;
        let country_code = rom.read_u8()?;

        Ok(Self {
            file_format,
            cart_id,
            country_code,
            crc1,
            crc2,
        })
    }
}

pub(crate) fn apply(
    source: &[u8],
    patch: &[u8],
    verify_checksums: bool,
    progress: &mut Progress,
) -> Result<Vec<u8>> {
    let mut patch = PatchStream::new(patch, Endian::Little);
    patch.seek(5);

    let mode = patch.read_u8()?;
    let encoding = patch.read_u8()?;
    patch.skip(DESCRIPTION_LEN)?;

    let target_size = match mode {
        MODE_SIMPLE => patch.read_u32()?,
        MODE_N64 => {
            let header = N64Header::parse(&mut patch)?;
            patch.skip(5)?;
            let target_size = patch.read_u32()?;

            if verify_checksums && N64Header::from_rom(source, header.file_format)? != header {
                return Err(PatchError::SourceChecksumMismatch);
            }
            target_size
        }
        _ => return Err(PatchError::Unimplemented("aps patch mode")),
    } as usize;

    if encoding != ENC_SIMPLE {
        return Err(PatchError::Unimplemented("aps encoding method"));
    }

    debug!("aps: mode {mode}, target size {target_size:#x}");

    let mut target = target_from_source(source, target_size)?;

    while !patch.is_eof() {
        let offset = patch.read_u32()? as usize;
        let len = patch.read_u8()?;

        if len != 0 {
            write_at(&mut target, offset, patch.read_bytes(len as usize)?)?;
        } else {
            let byte = patch.read_u8()?;
            let run_len = patch.read_u8()?;
            trace!("aps: run of {run_len} x {byte:#04x} at {offset:#x}");
            fill_at(&mut target, offset, run_len as usize, byte)?;
        }

        progress.update(patch.offset(), patch.len());
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn decode(source: &[u8], patch: &[u8], verify: bool) -> Result<Vec<u8>> {
        apply(source, patch, verify, &mut Progress::new(&mut NoProgress))
    }

    fn simple_header(target_size: u32) -> Vec<u8> {
        let mut p = b"APS10".to_vec();
        p.extend([MODE_SIMPLE, ENC_SIMPLE]);
        p.extend([b' '; DESCRIPTION_LEN]);
        p.extend(target_size.to_le_bytes());
        p
    }

    fn rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x48];
        rom[0x10..0x14].copy_from_slice(&0x1122_3344u32.to_be_bytes());
        rom[0x14..0x18].copy_from_slice(&0x5566_7788u32.to_be_bytes());
        rom[0x3c..0x3e].copy_from_slice(b"NM");
        rom[0x3e] = b'E';
        rom
    }

    fn n64_header(file_format: u8, target_size: u32) -> Vec<u8> {
        let mut p = b"APS10".to_vec();
        p.extend([MODE_N64, ENC_SIMPLE]);
        p.extend([0; DESCRIPTION_LEN]);
        p.push(file_format);
        p.extend(b"NM");
        p.push(b'E');
        p.extend(0x1122_3344u32.to_be_bytes());
        p.extend(0x5566_7788u32.to_be_bytes());
        p.extend([0; 5]);
        p.extend(target_size.to_le_bytes());
        p
    }

    #[test]
    fn simple_mode_records() {
        let source = [0u8, 1, 2, 3, 4, 5];
        let mut patch = simple_header(8);
        patch.extend(1u32.to_le_bytes());
        patch.extend([2, 0xaa, 0xbb]);
        patch.extend(4u32.to_le_bytes());
        patch.extend([0, 0xcc, 4]);

        assert_eq!(
            decode(&source, &patch, true).unwrap(),
            [0, 0xaa, 0xbb, 3, 0xcc, 0xcc, 0xcc, 0xcc]
        );
    }

    #[test]
    fn record_past_target_end() {
        let mut patch = simple_header(4);
        patch.extend(3u32.to_le_bytes());
        patch.extend([2, 1, 2]);

        assert_eq!(
            decode(&[0; 4], &patch, true),
            Err(PatchError::WriteOutOfBounds(2, 3, 4))
        );
    }

    #[test]
    fn n64_header_check() {
        let source = rom();
        let mut patch = n64_header(1, 0x48);
        patch.extend(0x40u32.to_le_bytes());
        patch.extend([1, 0x99]);

        let target = decode(&source, &patch, true).unwrap();
        assert_eq!(target[0x40], 0x99);
        assert_eq!(target[..0x40], source[..0x40]);

        let mut other = source.clone();
        other[0x3e] = b'J';
        assert_eq!(
            decode(&other, &patch, true),
            Err(PatchError::SourceChecksumMismatch)
        );
        assert!(decode(&other, &patch, false).is_ok());
    }

    #[test]
    fn n64_v64_source_is_swapped_for_comparison() {
        let mut source = rom();
        byteswap(&mut source[..ROM_HEADER_LEN]);
        let original = source.clone();

        let patch = n64_header(N64_FMT_V64, 0x48);
        assert_eq!(decode(&source, &patch, true).unwrap(), original);
        assert_eq!(source, original);

        let z64 = n64_header(1, 0x48);
        assert_eq!(
            decode(&source, &z64, true),
            Err(PatchError::SourceChecksumMismatch)
        );
    }

    #[test]
    fn unsupported_encoding() {
        let mut patch = simple_header(4);
        patch[6] = 1;
        assert_eq!(
            decode(&[0; 4], &patch, true),
            Err(PatchError::Unimplemented("aps encoding method"))
        );
    }
}
