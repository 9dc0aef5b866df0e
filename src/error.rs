use thiserror::Error;

/// Failures raised while decoding a single bundle file.
///
/// These are always scoped to one file: the importer records them in the
/// [`ImportLog`](crate::log::ImportLog) and moves on to the next file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated data at 0x{offset:X}: need {need} bytes, {available} available")]
    TruncatedData {
        offset: usize,
        need: usize,
        available: usize,
    },
    #[error("unrecognized format at 0x{offset:X}: expected magic 0x{expected:08X}, found 0x{found:08X}")]
    UnrecognizedFormat {
        offset: usize,
        expected: u32,
        found: u32,
    },
    #[error("invalid UTF-8 string at 0x{offset:X}")]
    InvalidString { offset: usize },
    #[error("{what} index {index} out of range (count: {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        count: usize,
    },
    #[error("required '{0}' blob is missing")]
    MissingBlob(&'static str),
    #[error("unsupported index stride {0} (expected 2 or 4)")]
    UnsupportedIndexStride(u16),
    #[error("unknown shader parameter type {ty} at 0x{offset:X}")]
    UnknownParameterType { ty: u8, offset: usize },
}

impl DecodeError {
    /// Absolute file offset the failure was detected at, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            DecodeError::TruncatedData { offset, .. }
            | DecodeError::UnrecognizedFormat { offset, .. }
            | DecodeError::InvalidString { offset }
            | DecodeError::UnknownParameterType { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Failures of the path resolver. Always recoverable: the caller logs them
/// and leaves the texture channel (or parent material) unset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("could not resolve '{reference}' under the car folder, its parents or the media root")]
    TextureNotFound { reference: String },
    #[error("empty path reference")]
    EmptyReference,
}

/// Run-level failures. Only these abort an import.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("car folder '{}' does not exist or is not a directory", path.display())]
    InvalidRoot { path: std::path::PathBuf },
}
