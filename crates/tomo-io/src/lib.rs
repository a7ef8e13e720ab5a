//! Filesystem input and output for tomo-core.
//!
//! - [`DirectoryFrameSource`] loads a directory of projection images as a
//!   [`tomo_core::ProjectionStack`]
//! - [`SliceWriter`] writes one 16-bit PNG per reconstructed slice
//! - [`VolumeWriter`] stores the whole volume as a Zarr V3 array together
//!   with the calibration that produced it

pub mod error;
pub mod frames;
pub mod slices;
pub mod volume;

pub use error::{IoError, Result};
pub use frames::{read_frame, DirectoryFrameSource};
pub use slices::{to_u16, SliceWriter};
pub use volume::{read_volume, VolumeCompression, VolumeMetadata, VolumeWriter};
