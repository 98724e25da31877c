//! Error types for streamline codecs and conversions.

use std::path::PathBuf;

use crate::formats::Format;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading, writing or converting streamline files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying storage failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not carry the signature of the requested format.
    #[error("not a {format} file: {}", path.display())]
    FormatMismatch {
        /// Codec that was asked to open the file.
        format: Format,
        /// Offending path.
        path: PathBuf,
    },

    /// Header content that cannot be parsed or reconciled.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Body content that cannot be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// ASCII VTK input rejected while normalizing it to binary.
    #[error("malformed ASCII VTK: {0}")]
    MalformedAscii(String),

    /// Anatomy file with an unrecognized extension (strict mode only).
    #[error("unsupported anatomy file: {}", .0.display())]
    UnsupportedAnatomy(PathBuf),

    /// Affine matrix that is singular or malformed.
    #[error("invalid affine: {0}")]
    InvalidAffine(String),

    /// Append would overflow the space reserved when the file was created.
    #[error("capacity exceeded: {reserved} reserved, {requested} requested")]
    CapacityExceeded {
        /// Number of slots reserved at creation.
        reserved: usize,
        /// Number of slots the append needs.
        requested: usize,
    },

    /// Append on a sink that has already been closed.
    #[error("streamline sink is closed")]
    Closed,

    /// No codec matches the given name, extension or content.
    #[error("unknown streamline format: {0}")]
    UnknownFormat(String),
}

impl Error {
    pub(crate) fn mismatch(format: Format, path: impl Into<PathBuf>) -> Self {
        Self::FormatMismatch {
            format,
            path: path.into(),
        }
    }
}
