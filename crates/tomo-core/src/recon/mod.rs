//! Slice-by-slice reconstruction of a prepared projection array.
//!
//! Every detector row of the prepared `(frame, row, column)` array gives one
//! sinogram `(frame, column)`. Sinograms are independent, so they are
//! reconstructed in parallel, each worker writing only the output slot of
//! its own row:
//!
//! ```text
//!  prepared (F, H, W)
//!        │  row j
//!        ▼
//!  sinogram (F, W) ──► SliceReconstructor ──► slice (W, W) ──► volume[j]
//! ```

mod radon;
mod visual_hull;

pub use radon::{Backprojection, Sart};
pub use visual_hull::VisualHull;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::angles::AngleCalibration;
use crate::error::{Result, TomoError};
use crate::progress::{CancellationToken, ProgressObserver};

/// A strategy that turns one sinogram into one reconstructed slice.
pub trait SliceReconstructor: Send + Sync {
    /// Short name used in logs and output metadata.
    fn name(&self) -> &'static str;

    /// Reconstruct a `(width, width)` slice from a `(views, width)`
    /// sinogram taken at `angles` degrees.
    fn reconstruct(&self, sinogram: ArrayView2<'_, f32>, angles: &[f64]) -> Result<Array2<f32>>;
}

/// Reconstruction algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconAlgorithm {
    /// Unfiltered backprojection.
    FilteredBackprojection,
    /// SART with the given number of sweeps.
    AlgebraicIterative { iterations: usize },
    /// Silhouette carving with the given absorption threshold.
    VisualHull { threshold: f32 },
}

impl ReconAlgorithm {
    /// Parse the algorithm names accepted in configuration files.
    pub fn from_name(name: &str, iterations: usize, threshold: f32) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fbp" => Ok(Self::FilteredBackprojection),
            "sart" => Ok(Self::AlgebraicIterative { iterations }),
            "visualhulls" | "visual_hull" => Ok(Self::VisualHull { threshold }),
            other => Err(TomoError::config(format!(
                "unknown reconstruction algorithm '{}', expected fbp, sart or visualhulls",
                other
            ))),
        }
    }

    /// Resolve into a concrete reconstructor.
    pub fn reconstructor(&self) -> Result<Box<dyn SliceReconstructor>> {
        match *self {
            Self::FilteredBackprojection => Ok(Box::new(Backprojection)),
            Self::AlgebraicIterative { iterations } => {
                if iterations == 0 {
                    return Err(TomoError::config("SART needs at least one iteration"));
                }
                Ok(Box::new(Sart::new(iterations)))
            }
            Self::VisualHull { threshold } => Ok(Box::new(VisualHull::new(threshold))),
        }
    }
}

/// Reconstructed slices laid out `(slice, y, x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconVolume {
    data: Array3<f32>,
}

impl ReconVolume {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn slice_count(&self) -> usize {
        self.data.dim().0
    }

    /// Side length of each square slice.
    pub fn slice_width(&self) -> usize {
        self.data.dim().2
    }

    pub fn slice(&self, index: usize) -> Result<ArrayView2<'_, f32>> {
        if index >= self.slice_count() {
            return Err(TomoError::bounds(
                format!("slice {}", index),
                format!("{} slices", self.slice_count()),
            ));
        }
        Ok(self.data.index_axis(Axis(0), index))
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.data
    }

    /// Keep the centred square that lies inside the reconstruction circle.
    ///
    /// The side is `floor(sqrt(W² / 2))`, reduced by one when its parity
    /// differs from `W` so the square stays centred.
    pub fn crop_circle(&self) -> Self {
        let (start, side) = circle_square(self.slice_width());
        let data = self
            .data
            .slice(s![.., start..start + side, start..start + side])
            .to_owned();
        Self { data }
    }
}

/// Start and side of the largest centred square inside a `width` circle.
pub fn circle_square(width: usize) -> (usize, usize) {
    let mut side = ((width * width) as f64 / 2.0).sqrt().floor() as usize;
    if side % 2 != width % 2 {
        side = side.saturating_sub(1);
    }
    ((width - side) / 2, side)
}

/// Runs a [`ReconAlgorithm`] over every row of a prepared projection array.
#[derive(Debug, Clone)]
pub struct ReconstructionOrchestrator {
    algorithm: ReconAlgorithm,
    crop_circle: bool,
    threads: usize,
}

impl ReconstructionOrchestrator {
    pub fn new(algorithm: ReconAlgorithm) -> Self {
        Self {
            algorithm,
            crop_circle: false,
            threads: 0,
        }
    }

    /// Crop every slice to the square inscribed in the reconstruction circle.
    pub fn with_crop_circle(mut self, crop_circle: bool) -> Self {
        self.crop_circle = crop_circle;
        self
    }

    /// Number of worker threads; `0` uses the global rayon pool.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn algorithm(&self) -> ReconAlgorithm {
        self.algorithm
    }

    /// Reconstruct one slice per row of `prepared`.
    pub fn run(
        &self,
        prepared: ArrayView3<'_, f32>,
        angles: &AngleCalibration,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<ReconVolume> {
        let (frames, rows, width) = prepared.dim();
        if frames != angles.num_images() {
            return Err(TomoError::shape_mismatch(
                format!("{} calibrated frames", angles.num_images()),
                format!("{} prepared frames", frames),
            ));
        }

        let reconstructor = self.algorithm.reconstructor()?;
        let started = Instant::now();
        info!(
            algorithm = reconstructor.name(),
            slices = rows,
            width,
            frames,
            threads = self.threads,
            "Starting reconstruction"
        );

        let run = || {
            self.reconstruct_rows(prepared, angles.angles(), reconstructor.as_ref(), progress, cancel)
        };
        let volume = if self.threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| TomoError::config(format!("failed to build worker pool: {}", e)))?
                .install(run)?
        } else {
            run()?
        };

        let volume = if self.crop_circle {
            volume.crop_circle()
        } else {
            volume
        };

        info!(
            algorithm = reconstructor.name(),
            slices = volume.slice_count(),
            slice_width = volume.slice_width(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reconstruction complete"
        );
        Ok(volume)
    }

    fn reconstruct_rows(
        &self,
        prepared: ArrayView3<'_, f32>,
        angles: &[f64],
        reconstructor: &dyn SliceReconstructor,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<ReconVolume> {
        let (_, rows, width) = prepared.dim();
        let mut volume = Array3::<f32>::zeros((rows, width, width));
        let completed = AtomicUsize::new(0);
        progress.start(rows);

        volume
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(row, mut slot)| -> Result<()> {
                if cancel.is_cancelled() {
                    return Err(TomoError::Cancelled {
                        completed: completed.load(Ordering::Relaxed),
                        total: rows,
                    });
                }

                let sinogram = prepared.index_axis(Axis(1), row);
                let slice = reconstructor.reconstruct(sinogram, angles).map_err(|e| match e {
                    TomoError::Reconstruction { .. } => e,
                    other => TomoError::Reconstruction {
                        slice: row,
                        message: other.to_string(),
                    },
                })?;
                if slice.dim() != slot.dim() {
                    return Err(TomoError::Reconstruction {
                        slice: row,
                        message: format!("produced {:?}, expected {:?}", slice.dim(), slot.dim()),
                    });
                }
                slot.assign(&slice);

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.advance(done, rows);
                Ok(())
            })
            .map_err(|e| {
                if let TomoError::Cancelled { completed, total } = &e {
                    warn!(completed, total, "Reconstruction cancelled");
                }
                e
            })?;

        Ok(ReconVolume::new(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::{AngleCalibration, AngularRange};
    use crate::filters::linspace;
    use crate::progress::{AtomicProgress, NoProgress};

    struct RowIndex;

    impl SliceReconstructor for RowIndex {
        fn name(&self) -> &'static str {
            "row-index"
        }

        fn reconstruct(&self, sinogram: ArrayView2<'_, f32>, _angles: &[f64]) -> Result<Array2<f32>> {
            let width = sinogram.ncols();
            Ok(Array2::from_elem((width, width), sinogram[[0, 0]]))
        }
    }

    fn calibration(frames: usize) -> AngleCalibration {
        AngleCalibration::from_parts(0, AngularRange::Full, linspace(0.0, 360.0, frames)).unwrap()
    }

    fn transmission(frames: usize, rows: usize, width: usize) -> Array3<f32> {
        // Opaque band across the middle columns of every frame
        Array3::from_shape_fn((frames, rows, width), |(_, _, c)| {
            if (c as isize - (width / 2) as isize).abs() < 3 {
                0.05
            } else {
                1.0
            }
        })
    }

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!(
            ReconAlgorithm::from_name("fbp", 1, 0.5).unwrap(),
            ReconAlgorithm::FilteredBackprojection
        );
        assert_eq!(
            ReconAlgorithm::from_name("SART", 3, 0.5).unwrap(),
            ReconAlgorithm::AlgebraicIterative { iterations: 3 }
        );
        assert_eq!(
            ReconAlgorithm::from_name("visualhulls", 1, 0.7).unwrap(),
            ReconAlgorithm::VisualHull { threshold: 0.7 }
        );
        assert!(matches!(
            ReconAlgorithm::from_name("art", 1, 0.5),
            Err(TomoError::Config(_))
        ));
    }

    #[test]
    fn test_sart_requires_iterations() {
        assert!(ReconAlgorithm::AlgebraicIterative { iterations: 0 }
            .reconstructor()
            .is_err());
    }

    #[test]
    fn test_circle_square() {
        // floor(sqrt(64*64/2)) = 45, odd vs even width -> 44
        assert_eq!(circle_square(64), (10, 44));
        // floor(sqrt(63*63/2)) = 44, even vs odd width -> 43
        assert_eq!(circle_square(63), (10, 43));
    }

    #[test]
    fn test_each_row_fills_its_own_slot() {
        let prepared = Array3::from_shape_fn((4, 5, 6), |(_, r, _)| r as f32);
        let volume = ReconstructionOrchestrator::new(ReconAlgorithm::FilteredBackprojection)
            .reconstruct_rows(
                prepared.view(),
                &linspace(0.0, 360.0, 4),
                &RowIndex,
                &NoProgress,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(volume.view().dim(), (5, 6, 6));
        for row in 0..5 {
            assert!(volume.slice(row).unwrap().iter().all(|v| *v == row as f32));
        }
    }

    #[test]
    fn test_run_visual_hull_with_progress() {
        let frames = 36;
        let prepared = transmission(frames, 4, 16);
        let progress = AtomicProgress::new();
        let volume = ReconstructionOrchestrator::new(ReconAlgorithm::VisualHull { threshold: 0.5 })
            .with_threads(2)
            .run(prepared.view(), &calibration(frames), &progress, &CancellationToken::new())
            .unwrap();

        assert_eq!(volume.view().dim(), (4, 16, 16));
        assert_eq!(progress.completed(), 4);
        assert_eq!(progress.total(), 4);
        // Centre cell is inside the band from every angle
        assert!(volume.slice(0).unwrap()[[8, 8]] > 0.0);
        assert_eq!(volume.slice(0).unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_run_crops_circle() {
        let frames = 12;
        let prepared = transmission(frames, 2, 16);
        let volume = ReconstructionOrchestrator::new(ReconAlgorithm::FilteredBackprojection)
            .with_crop_circle(true)
            .run(prepared.view(), &calibration(frames), &NoProgress, &CancellationToken::new())
            .unwrap();
        let (start, side) = circle_square(16);
        assert_eq!(start, 3);
        assert_eq!(volume.view().dim(), (2, side, side));
    }

    #[test]
    fn test_cancelled_run_returns_no_volume() {
        let frames = 8;
        let prepared = transmission(frames, 6, 8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ReconstructionOrchestrator::new(ReconAlgorithm::FilteredBackprojection).run(
            prepared.view(),
            &calibration(frames),
            &NoProgress,
            &cancel,
        );
        assert!(matches!(result, Err(TomoError::Cancelled { total: 6, .. })));
    }

    #[test]
    fn test_frame_count_must_match_calibration() {
        let prepared = transmission(5, 2, 8);
        let result = ReconstructionOrchestrator::new(ReconAlgorithm::FilteredBackprojection).run(
            prepared.view(),
            &calibration(6),
            &NoProgress,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(TomoError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_slice_failure_aborts_run() {
        struct Failing;
        impl SliceReconstructor for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn reconstruct(&self, _sinogram: ArrayView2<'_, f32>, _angles: &[f64]) -> Result<Array2<f32>> {
                Err(TomoError::input("bad sinogram"))
            }
        }

        let prepared = transmission(4, 3, 8);
        let result = ReconstructionOrchestrator::new(ReconAlgorithm::FilteredBackprojection)
            .reconstruct_rows(
                prepared.view(),
                &linspace(0.0, 360.0, 4),
                &Failing,
                &NoProgress,
                &CancellationToken::new(),
            );
        assert!(matches!(result, Err(TomoError::Reconstruction { .. })));
    }
}
