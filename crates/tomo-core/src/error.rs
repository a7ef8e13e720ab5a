//! Error types for calibration and reconstruction.

use thiserror::Error;

/// Errors that can occur while calibrating or reconstructing a projection stack.
#[derive(Error, Debug)]
pub enum TomoError {
    /// Missing, empty or inconsistent input frames.
    #[error("input error: {0}")]
    Input(String),

    /// Manual angular range outside {180, 360}.
    #[error("invalid angular range {0}: images must cover a rotational range of 180 or 360 degrees")]
    InvalidRange(u32),

    /// An automatic calibration step could not produce a result.
    #[error("calibration failed: {0}")]
    Calibration(String),

    /// A crop, offset or index does not fit the frame geometry.
    #[error("requested {requested} exceeds available {available}")]
    Bounds {
        requested: String,
        available: String,
    },

    /// Two arrays that must agree in shape do not.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: String,
        actual: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A slice reconstruction failed.
    #[error("reconstruction of slice {slice} failed: {message}")]
    Reconstruction { slice: usize, message: String },

    /// The run was cancelled between slices.
    #[error("reconstruction cancelled after {completed} of {total} slices")]
    Cancelled { completed: usize, total: usize },

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(String),
}

impl TomoError {
    /// Create an Input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a Calibration error.
    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration(msg.into())
    }

    /// Create a Bounds error.
    pub fn bounds(requested: impl Into<String>, available: impl Into<String>) -> Self {
        Self::Bounds {
            requested: requested.into(),
            available: available.into(),
        }
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<std::io::Error> for TomoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for TomoError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for calibration and reconstruction operations.
pub type Result<T> = std::result::Result<T, TomoError>;
