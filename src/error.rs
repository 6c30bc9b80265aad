use thiserror::Error;

pub type Result<T> = std::result::Result<T, PatchError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("unknown patch format")]
    UnknownFormat,
    #[error("unhandled format version: `{0}`")]
    UnhandledFormatVersion(String),
    #[error("unimplemented feature: {0}")]
    Unimplemented(&'static str),
    #[error("source checksum mismatch - patch is not meant for this rom")]
    SourceChecksumMismatch,
    #[error("patch checksum mismatch - patch file may be corrupt")]
    PatchChecksumMismatch,
    #[error("target checksum mismatch")]
    TargetChecksumMismatch,
    #[error("decoding error: {0}")]
    GenericDecode(String),
    #[error("attempted to read `{0}` byte(s) out of bounds (index: `{1}`, length: `{2}`)")]
    ReadOutOfBounds(usize, usize, usize),
    #[error("attempted to write `{0}` byte(s) out of bounds (index: `{1}`, length: `{2}`)")]
    WriteOutOfBounds(usize, usize, usize),
}

impl PatchError {
    pub(crate) fn overflow(what: &str) -> Self {
        PatchError::GenericDecode(format!("{what} overflowed"))
    }
}
