use serde::Serialize;

use crate::{
    aps, bps,
    error::{PatchError, Result},
    ips, ppf,
    progress::Progress,
    star_rod, ups, vcdiff, yay0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchFormat {
    Aps,
    Bps,
    Ips,
    Ppf,
    Ups,
    Vcdiff,
    Mod,
}

/// Leading bytes of each format, tested in this order.
const SIGNATURES: [(&[u8], PatchFormat); 8] = [
    (b"APS10", PatchFormat::Aps),
    (b"BPS1", PatchFormat::Bps),
    (b"PATCH", PatchFormat::Ips),
    (b"PPF", PatchFormat::Ppf),
    (b"UPS1", PatchFormat::Ups),
    (&[0xd6, 0xc3, 0xc4], PatchFormat::Vcdiff),
    (b"PMSR", PatchFormat::Mod),
    (yay0::MAGIC, PatchFormat::Mod),
];

impl PatchFormat {
    pub fn detect(patch: &[u8]) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(magic, _)| patch.starts_with(magic))
            .map(|&(_, format)| format)
    }

    pub fn name(self) -> &'static str {
        match self {
            PatchFormat::Aps => "aps",
            PatchFormat::Bps => "bps",
            PatchFormat::Ips => "ips",
            PatchFormat::Ppf => "ppf",
            PatchFormat::Ups => "ups",
            PatchFormat::Vcdiff => "vcdiff",
            PatchFormat::Mod => "mod",
        }
    }

    /// Whether patches of this format can carry data that `verify_checksums`
    /// checks. APS only does so in N64 mode.
    pub fn has_checksums(self) -> bool {
        matches!(
            self,
            PatchFormat::Aps | PatchFormat::Bps | PatchFormat::Ups | PatchFormat::Vcdiff
        )
    }

    pub(crate) fn apply(
        self,
        source: &[u8],
        patch: &[u8],
        verify_checksums: bool,
        progress: &mut Progress,
    ) -> Result<Vec<u8>> {
        match self {
            PatchFormat::Aps => aps::apply(source, patch, verify_checksums, progress),
            PatchFormat::Bps => bps::apply(source, patch, verify_checksums, progress),
            PatchFormat::Ips => ips::apply(source, patch, verify_checksums, progress),
            PatchFormat::Ppf => ppf::apply(source, patch, verify_checksums, progress),
            PatchFormat::Ups => ups::apply(source, patch, verify_checksums, progress),
            PatchFormat::Vcdiff => vcdiff::apply(source, patch, verify_checksums, progress),
            PatchFormat::Mod => star_rod::apply(source, patch, verify_checksums, progress),
        }
    }
}

impl TryFrom<&[u8]> for PatchFormat {
    type Error = PatchError;

    fn try_from(patch: &[u8]) -> Result<Self> {
        Self::detect(patch).ok_or(PatchError::UnknownFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures() {
        let cases: [(&[u8], PatchFormat); 8] = [
            (b"APS10\x00\x00", PatchFormat::Aps),
            (b"BPS1", PatchFormat::Bps),
            (b"PATCHEOF", PatchFormat::Ips),
            (b"PPF30", PatchFormat::Ppf),
            (b"UPS1\x80\x80", PatchFormat::Ups),
            (&[0xd6, 0xc3, 0xc4, 0x00, 0x00], PatchFormat::Vcdiff),
            (b"PMSR\x00\x00\x00\x00", PatchFormat::Mod),
            (b"Yay0", PatchFormat::Mod),
        ];

        for (patch, format) in cases {
            assert_eq!(PatchFormat::detect(patch), Some(format), "{patch:x?}");
        }
    }

    #[test]
    fn unknown() {
        for patch in [&b""[..], b"APS1", b"aps10", b"PAT", &[0xd6, 0xc3, 0xc5]] {
            assert_eq!(PatchFormat::detect(patch), None);
            assert_eq!(
                PatchFormat::try_from(patch),
                Err(PatchError::UnknownFormat)
            );
        }
    }

    #[test]
    fn names_are_lowercase_variants() {
        for (_, format) in SIGNATURES {
            let tag = format!("{format:?}").to_lowercase();
            assert_eq!(format.name(), tag);
        }
    }
}
