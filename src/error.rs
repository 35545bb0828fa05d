//! Error types shared by the optimizer and the batch walker.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while optimizing a single image.
///
/// These never escape a batch: the walker turns them into failed
/// [`ProcessResult`](crate::batch::ProcessResult)s and moves on.
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// Input is unreadable, corrupt or in a format the decoder does not know.
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// The encoder rejected the pixel data or the output format.
    #[error("Failed to encode {format}: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },
    /// Missing path, permission problem, disk full.
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Quality {0} is outside the supported range 30-100")]
    InvalidQuality(u8),
}

impl OptimizeError {
    pub fn encode(format: &'static str, message: impl Into<String>) -> Self {
        Self::Encode {
            format,
            message: message.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Failure that stops a whole run before any file is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),
    #[error("Input is neither a file nor a folder: {0}")]
    UnsupportedInput(PathBuf),
    #[error("Failed to prepare output folder {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
