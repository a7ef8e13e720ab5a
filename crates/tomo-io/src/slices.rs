//! One 16-bit PNG per reconstructed slice.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::{debug, info};

use tomo_core::ReconVolume;

use crate::error::{IoError, Result};

/// Writes `0000.png`, `0001.png`, ... into an output directory.
#[derive(Debug, Clone)]
pub struct SliceWriter {
    dir: PathBuf,
}

impl SliceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The `reconstruction` directory next to a frame directory.
    pub fn beside(frame_dir: &Path) -> Self {
        let parent = frame_dir.parent().unwrap_or_else(|| Path::new("."));
        Self::new(parent.join("reconstruction"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory, removing regular files left by a previous run.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut removed = 0usize;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(dir = %self.dir.display(), removed, "Cleared output directory");
        }
        Ok(())
    }

    /// Write every slice, each stretched independently to the full 16-bit range.
    pub fn write(&self, volume: &ReconVolume) -> Result<Vec<PathBuf>> {
        self.prepare()?;

        let paths = (0..volume.slice_count())
            .into_par_iter()
            .map(|index| -> Result<PathBuf> {
                let path = self.dir.join(format!("{:04}.png", index));
                let pixels = to_u16(volume.slice(index)?);
                let (height, width) = (pixels.nrows() as u32, pixels.ncols() as u32);
                let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
                    ImageBuffer::from_raw(width, height, pixels.iter().copied().collect())
                        .ok_or_else(|| IoError::Encode {
                            path: path.clone(),
                            message: "buffer does not match slice size".to_string(),
                        })?;
                buffer.save(&path).map_err(|e| IoError::Encode {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                Ok(path)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(dir = %self.dir.display(), slices = paths.len(), "Wrote slices");
        Ok(paths)
    }
}

/// Min/max stretch of a slice to `0..=65535`. A flat slice maps to zero.
pub fn to_u16(slice: ArrayView2<'_, f32>) -> ndarray::Array2<u16> {
    let (min, max) = slice
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = max - min;

    slice.mapv(|v| {
        if span <= 0.0 || !v.is_finite() {
            0
        } else {
            (((v - min) / span) * u16::MAX as f32).round() as u16
        }
    })
}
