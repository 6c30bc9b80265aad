use log::debug;

use crate::{
    error::{PatchError, Result},
    progress::Progress,
    stream::{
        read_biased_number, read_biased_usize, to_usize, write_at, zeroed, Endian, PatchStream,
    },
    ups::Checksums,
};

const SOURCE_READ: u64 = 0;
const TARGET_READ: u64 = 1;
const SOURCE_COPY: u64 = 2;
const TARGET_COPY: u64 = 3;

/// Applies a sign-magnitude delta (low bit is the sign) to a relative cursor.
fn read_relative(stream: &mut PatchStream, cursor: usize) -> Result<usize> {
    let data = read_biased_number(stream)?;
    let magnitude = to_usize(data >> 1)?;

    if data & 1 != 0 {
        cursor.checked_sub(magnitude)
    } else {
        cursor.checked_add(magnitude)
    }
    .ok_or_else(|| PatchError::GenericDecode(format!("relative offset out of range: {data:#x}")))
}

fn source_slice(source: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| source.get(offset..end))
        .ok_or(PatchError::ReadOutOfBounds(len, offset, source.len()))
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
    let source_size = read_biased_usize(&mut stream)?;
    let target_size = read_biased_usize(&mut stream)?;
    let metadata_size = read_biased_usize(&mut stream)?;
    stream.skip(metadata_size)?;
    debug!(
        "bps: source size {source_size:#x}, target size {target_size:#x}, {metadata_size} byte(s) of metadata"
    );

    let mut target = zeroed(target_size)?;
    let mut target_offset = 0usize;
    let mut source_relative = 0usize;
    let mut target_relative = 0usize;

    while stream.offset() < checksum_offset {
        let data = read_biased_number(&mut stream)?;
        let len = to_usize((data >> 2) + 1)?;

        match data & 3 {
            SOURCE_READ => {
                write_at(
                    &mut target,
                    target_offset,
                    source_slice(source, target_offset, len)?,
                )?;
            }
            TARGET_READ => {
                write_at(&mut target, target_offset, stream.read_bytes(len)?)?;
            }
            SOURCE_COPY => {
                source_relative = read_relative(&mut stream, source_relative)?;
                write_at(
                    &mut target,
                    target_offset,
                    source_slice(source, source_relative, len)?,
                )?;
                source_relative += len;
            }
            TARGET_COPY => {
                target_relative = read_relative(&mut stream, target_relative)?;

                // byte by byte: the ranges may overlap to repeat a pattern
                for i in 0..len {
                    let from = target_relative + i;
                    let to = target_offset + i;
                    if from >= to {
                        return Err(PatchError::ReadOutOfBounds(1, from, to));
                    }
                    let byte = target[from];
                    *target
                        .get_mut(to)
                        .ok_or(PatchError::WriteOutOfBounds(1, to, target_size))? = byte;
                }
                target_relative += len;
            }
            command => {
                return Err(PatchError::GenericDecode(format!(
                    "unknown bps command {command}"
                )))
            }
        }

        target_offset += len;
        progress.update(stream.offset(), patch.len());
    }

    if verify_checksums {
        checksums.verify_target(&target)?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{checksum::crc32, progress::NoProgress};

    fn decode(source: &[u8], patch: &[u8], verify: bool) -> Result<Vec<u8>> {
        apply(source, patch, verify, &mut Progress::new(&mut NoProgress))
    }

    fn num(n: u8) -> u8 {
        assert!(n < 0x80);
        n | 0x80
    }

    fn action(command: u64, len: u8) -> u8 {
        num(((len - 1) << 2) | command as u8)
    }

    fn relative(delta: i8) -> u8 {
        num(((delta.unsigned_abs()) << 1) | u8::from(delta < 0))
    }

    fn build(source: &[u8], target: &[u8], metadata: &[u8], body: &[u8]) -> Vec<u8> {
        let mut p = b"BPS1".to_vec();
        p.extend([
            num(source.len() as u8),
            num(target.len() as u8),
            num(metadata.len() as u8),
        ]);
        p.extend(metadata);
        p.extend(body);
        p.extend(crc32(source).to_le_bytes());
        p.extend(crc32(target).to_le_bytes());
        let patch_crc = crc32(&p);
        p.extend(patch_crc.to_le_bytes());
        p
    }

    fn fixture() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let source = b"abcdefgh".to_vec();
        let target = b"abcdXYfgh-cdabababab".to_vec();
        let body = [
            action(SOURCE_READ, 4),
            action(TARGET_READ, 2),
            b'X',
            b'Y',
            // source cursor 0 -> 5, copies "fgh"
            action(SOURCE_COPY, 3),
            relative(5),
            action(TARGET_READ, 1),
            b'-',
            // source cursor 8 -> 2 -> 0, copies "cd" then "ab"
            action(SOURCE_COPY, 2),
            relative(-6),
            action(SOURCE_COPY, 2),
            relative(-4),
            // target cursor 0 -> 12, repeats "ab" through overlap
            action(TARGET_COPY, 6),
            relative(12),
        ];
        let patch = build(&source, &target, b"<meta/>", &body);
        (source, target, patch)
    }

    #[test]
    fn all_commands() {
        let (source, target, patch) = fixture();
        assert_eq!(decode(&source, &patch, true).unwrap(), target);
    }

    #[test]
    fn corrupted_checksums() {
        let (source, target, patch) = fixture();
        let trailer = patch.len() - 12;

        for (i, err) in [
            PatchError::SourceChecksumMismatch,
            PatchError::TargetChecksumMismatch,
            PatchError::PatchChecksumMismatch,
        ]
        .into_iter()
        .enumerate()
        {
            let mut bad = patch.clone();
            bad[trailer + i * 4] ^= 0x01;
            if i < 2 {
                let end = bad.len() - 4;
                let crc = crc32(&bad[..end]);
                bad[end..].copy_from_slice(&crc.to_le_bytes());
            }
            assert_eq!(decode(&source, &bad, true), Err(err));
            assert_eq!(decode(&source, &bad, false).unwrap(), target);
        }
    }

    #[test]
    fn source_read_past_source() {
        let source = [1u8, 2];
        let target = [1u8, 2, 3];
        let patch = build(&source, &target, &[], &[action(SOURCE_READ, 3)]);
        assert_eq!(
            decode(&source, &patch, false),
            Err(PatchError::ReadOutOfBounds(3, 0, 2))
        );
    }

    #[test]
    fn write_past_target() {
        let source = [1u8, 2, 3];
        let target = [1u8, 2];
        let patch = build(&source, &target, &[], &[action(SOURCE_READ, 3)]);
        assert_eq!(
            decode(&source, &patch, false),
            Err(PatchError::WriteOutOfBounds(3, 0, 2))
        );
    }

    #[test]
    fn negative_relative_underflow() {
        let source = [1u8, 2];
        let patch = build(&source, &source, &[], &[action(SOURCE_COPY, 1), relative(-1)]);
        assert!(matches!(
            decode(&source, &patch, false),
            Err(PatchError::GenericDecode(_))
        ));
    }

    #[test]
    fn oversized_target() {
        let mut patch = b"BPS1".to_vec();
        patch.push(num(0));
        // biased encoding of u64::MAX
        patch.extend([0x7f, 0x7e, 0x7e, 0x7e, 0x7e, 0x7e, 0x7e, 0x7e, 0x7e, 0x80]);
        patch.push(num(0));
        patch.extend([0; 12]);
        assert!(matches!(
            decode(&[], &patch, false),
            Err(PatchError::GenericDecode(_))
        ));
    }
}
