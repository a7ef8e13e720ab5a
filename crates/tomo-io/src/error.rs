//! Error types for frame input and reconstruction output.

use std::path::PathBuf;

use thiserror::Error;
use tomo_core::TomoError;

/// Errors that can occur while reading frames or writing results.
#[derive(Error, Debug)]
pub enum IoError {
    /// The frame directory holds no matching files.
    #[error("no *.{extension} frames found in {dir}")]
    NoFrames { dir: PathBuf, extension: String },

    /// A frame could not be decoded.
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// A slice image could not be encoded or saved.
    #[error("failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Zarr store error.
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal error.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Invalid stack or volume contents.
    #[error(transparent)]
    Core(#[from] TomoError),
}

impl IoError {
    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }
}

impl From<IoError> for TomoError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Core(inner) => inner,
            IoError::NoFrames { .. } | IoError::Decode { .. } => TomoError::Input(err.to_string()),
            other => TomoError::Io(other.to_string()),
        }
    }
}

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, IoError>;
