//! Projection frames read from a directory of image files.
//!
//! Files are ordered by name, which must sort in acquisition order
//! (zero-padded frame numbers). Every frame is converted to luminance and
//! scaled into `[0, 1]` regardless of its stored bit depth.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use tomo_core::{FrameSource, ProjectionStack};

use crate::error::{IoError, Result};

/// Reads every `*.{extension}` file directly inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    extension: String,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Matching frame files, sorted by file name.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(&self.extension))
                .unwrap_or(false);
            if matches {
                paths.push(entry.into_path());
            }
        }

        if paths.is_empty() {
            return Err(IoError::NoFrames {
                dir: self.dir.clone(),
                extension: self.extension.clone(),
            });
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        debug!(dir = %self.dir.display(), frames = paths.len(), "Discovered frames");
        Ok(paths)
    }

    /// Decode every discovered frame into a stack.
    pub fn read_stack(&self) -> Result<ProjectionStack> {
        let paths = self.discover()?;
        let frames = paths
            .par_iter()
            .map(|path| read_frame(path))
            .collect::<Result<Vec<_>>>()?;

        let stack = ProjectionStack::from_frames(frames)?;
        info!(
            dir = %self.dir.display(),
            frames = stack.frame_count(),
            width = stack.width(),
            height = stack.height(),
            "Loaded projection stack"
        );
        Ok(stack)
    }
}

impl FrameSource for DirectoryFrameSource {
    fn load(&mut self) -> tomo_core::Result<ProjectionStack> {
        Ok(self.read_stack()?)
    }
}

/// Decode one image file to `(row, column)` luminance in `[0, 1]`.
pub fn read_frame(path: &Path) -> Result<Array2<f32>> {
    let image = image::open(path).map_err(|e| IoError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // 8-bit sources are widened to 16-bit, so one scale fits both
    let luma = image.to_luma16();
    let (width, height) = luma.dimensions();
    let pixels: Vec<f32> = luma
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / u16::MAX as f32)
        .collect();

    Array2::from_shape_vec((height as usize, width as usize), pixels).map_err(|e| IoError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
