//! Geometry preparation applied before reconstruction.
//!
//! Turns the raw stack into the `(frame, row, column)` array handed to the
//! reconstruction orchestrator:
//!
//! ```text
//! ProjectionStack
//!      │
//!      ├─► trim 2·|cor_offset| columns (recentres the rotation axis)
//!      ├─► select num_images frames from p0 (or average whole rotations)
//!      ├─► crop left / right / top / bottom
//!      ├─► local-mean downsample (rows, cols)
//!      └─► optional median pre-filter
//! ```

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::angles::AngleCalibration;
use crate::centre::CenterCalibration;
use crate::error::{Result, TomoError};
use crate::filters::{downscale_local_mean, median_filter_zero};
use crate::stack::ProjectionStack;

/// Pixels trimmed from each side of every frame. `None` or `0` leaves that
/// side untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropRegion {
    #[serde(default)]
    pub left: Option<usize>,
    #[serde(default)]
    pub right: Option<usize>,
    #[serde(default)]
    pub top: Option<usize>,
    #[serde(default)]
    pub bottom: Option<usize>,
}

impl CropRegion {
    /// No cropping on any side.
    pub fn none() -> Self {
        Self::default()
    }

    /// Trim `width` columns from both sides plus `top` / `bottom` rows.
    pub fn symmetric(width: usize, top: usize, bottom: usize) -> Self {
        let bound = |v: usize| if v == 0 { None } else { Some(v) };
        Self {
            left: bound(width),
            right: bound(width),
            top: bound(top),
            bottom: bound(bottom),
        }
    }

    /// Row and column ranges that remain of a `(height, width)` frame.
    pub fn apply(&self, height: usize, width: usize) -> Result<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let left = self.left.unwrap_or(0);
        let right = self.right.unwrap_or(0);
        let top = self.top.unwrap_or(0);
        let bottom = self.bottom.unwrap_or(0);

        if left + right >= width {
            return Err(TomoError::bounds(
                format!("horizontal crop {} + {}", left, right),
                format!("width {}", width),
            ));
        }
        if top + bottom >= height {
            return Err(TomoError::bounds(
                format!("vertical crop {} + {}", top, bottom),
                format!("height {}", height),
            ));
        }

        Ok((top..height - bottom, left..width - right))
    }
}

/// Options controlling resolution and noise treatment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessOptions {
    /// Local-mean kernel `(rows, cols)`; `(1, 1)` keeps full resolution.
    pub downsample: (usize, usize),

    /// Average corresponding frames across every complete rotation.
    pub average: bool,

    /// Odd median kernel applied to each frame, if any.
    pub median_kernel: Option<usize>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            downsample: (4, 4),
            average: false,
            median_kernel: None,
        }
    }
}

/// Builds the reconstruction input from a calibrated stack.
#[derive(Debug, Clone, Copy)]
pub struct GeometryPreprocessor<'a> {
    stack: &'a ProjectionStack,
    angles: &'a AngleCalibration,
    centre: &'a CenterCalibration,
}

impl<'a> GeometryPreprocessor<'a> {
    pub fn new(
        stack: &'a ProjectionStack,
        angles: &'a AngleCalibration,
        centre: &'a CenterCalibration,
    ) -> Self {
        Self {
            stack,
            angles,
            centre,
        }
    }

    /// Row and column ranges of the raw frames that survive trimming and cropping.
    pub fn window(&self, crop: &CropRegion) -> Result<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let width = self.stack.width();
        self.centre.validate(width)?;

        let trim = self.centre.trim_columns();
        let (axis_start, axis_end) = if self.centre.cor_offset() >= 0 {
            (trim, width)
        } else {
            (0, width - trim)
        };

        let (rows, cols) = crop.apply(self.stack.height(), axis_end - axis_start)?;
        Ok((rows, (axis_start + cols.start)..(axis_start + cols.end)))
    }

    /// Raw frame indices contributing to each output frame.
    pub fn frame_groups(&self, average: bool) -> Result<Vec<Vec<usize>>> {
        let p0 = self.angles.reference_index();
        let n = self.angles.num_images();
        let available = self.stack.frame_count().saturating_sub(p0);

        let rotations = if average { available / n } else { 1 };
        if rotations == 0 || available < n {
            return Err(TomoError::bounds(
                format!("{} frames from reference {}", n, p0),
                format!("{} frames", self.stack.frame_count()),
            ));
        }
        if average {
            debug!(rotations, dropped = available - rotations * n, "Averaging rotations");
        }

        Ok((0..n)
            .map(|i| (0..rotations).map(|r| p0 + r * n + i).collect())
            .collect())
    }

    /// Produce the `(frame, row, column)` array for reconstruction.
    pub fn prepare(&self, crop: &CropRegion, options: &PreprocessOptions) -> Result<Array3<f32>> {
        if let Some(kernel) = options.median_kernel {
            if kernel % 2 == 0 {
                return Err(TomoError::config(format!(
                    "median kernel must be odd, got {}",
                    kernel
                )));
            }
        }

        let (rows, cols) = self.window(crop)?;
        let groups = self.frame_groups(options.average)?;

        let frames: Vec<Array2<f32>> = groups
            .par_iter()
            .map(|group| -> Result<Array2<f32>> {
                let mut acc = Array2::<f32>::zeros((rows.len(), cols.len()));
                for &idx in group {
                    let frame = self.stack.frame(idx)?;
                    acc += &frame.slice(s![rows.clone(), cols.clone()]);
                }
                acc /= group.len() as f32;

                let mut out = downscale_local_mean(acc.view(), options.downsample);
                if let Some(kernel) = options.median_kernel {
                    out = median_filter_zero(out.view(), kernel);
                }
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?;

        let views: Vec<ArrayView2<'_, f32>> = frames.iter().map(|f| f.view()).collect();
        let prepared = ndarray::stack(Axis(0), &views)
            .map_err(|e| TomoError::shape_mismatch("equal frame shapes", e.to_string()))?;

        let (count, height, width) = prepared.dim();
        info!(
            frames = count,
            height,
            width,
            cor_offset = self.centre.cor_offset(),
            average = options.average,
            "Prepared projections"
        );
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::AngleCalibrator;
    use crate::centre::CenterCalibrator;

    fn column_stack(frames: usize, height: usize, width: usize) -> ProjectionStack {
        // value = frame * 100 + column
        let frames = (0..frames)
            .map(|f| Array2::from_shape_fn((height, width), |(_, c)| (f * 100 + c) as f32))
            .collect();
        ProjectionStack::from_frames(frames).unwrap()
    }

    #[test]
    fn test_crop_symmetric() {
        let crop = CropRegion::symmetric(2, 0, 1);
        assert_eq!(crop.left, Some(2));
        assert_eq!(crop.right, Some(2));
        assert_eq!(crop.top, None);
        assert_eq!(crop.bottom, Some(1));
        assert_eq!(crop.apply(10, 10).unwrap(), (0..9, 2..8));
    }

    #[test]
    fn test_crop_rejects_oversize() {
        let crop = CropRegion {
            left: Some(5),
            right: Some(5),
            ..Default::default()
        };
        assert!(matches!(crop.apply(10, 10), Err(TomoError::Bounds { .. })));
        let crop = CropRegion {
            top: Some(10),
            ..Default::default()
        };
        assert!(matches!(crop.apply(10, 10), Err(TomoError::Bounds { .. })));
        assert!(CropRegion::none().apply(1, 1).is_ok());
    }

    #[test]
    fn test_positive_offset_trims_left() {
        let stack = column_stack(6, 2, 10);
        let angles = AngleCalibrator::new(&stack, 1).unwrap().manual(3, 360).unwrap();
        let centre = CenterCalibrator::new(&stack, &angles).manual(2).unwrap();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);

        let (_, cols) = pre.window(&CropRegion::none()).unwrap();
        assert_eq!(cols, 4..10);
    }

    #[test]
    fn test_negative_offset_trims_right() {
        let stack = column_stack(6, 2, 10);
        let angles = AngleCalibrator::new(&stack, 1).unwrap().manual(3, 360).unwrap();
        let centre = CenterCalibrator::new(&stack, &angles).manual(-1).unwrap();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);

        let crop = CropRegion {
            left: Some(1),
            ..Default::default()
        };
        let (_, cols) = pre.window(&crop).unwrap();
        assert_eq!(cols, 1..8);
    }

    #[test]
    fn test_prepare_selects_calibrated_frames() {
        let stack = column_stack(8, 2, 6);
        let angles = AngleCalibrator::new(&stack, 2).unwrap().manual(3, 360).unwrap();
        let centre = CenterCalibration::centred();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);

        let options = PreprocessOptions {
            downsample: (1, 1),
            ..Default::default()
        };
        let out = pre.prepare(&CropRegion::none(), &options).unwrap();

        assert_eq!(out.dim(), (3, 2, 6));
        assert_eq!(out[[0, 0, 0]], 200.0);
        assert_eq!(out[[2, 1, 5]], 405.0);
    }

    #[test]
    fn test_prepare_averages_rotations_and_truncates() {
        // p0 = 1, 3 images per rotation, 8 frames after p0 -> 2 whole rotations
        let stack = column_stack(9, 1, 4);
        let angles = AngleCalibrator::new(&stack, 1).unwrap().manual(3, 360).unwrap();
        let centre = CenterCalibration::centred();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);

        assert_eq!(
            pre.frame_groups(true).unwrap(),
            vec![vec![1, 4], vec![2, 5], vec![3, 6]]
        );

        let options = PreprocessOptions {
            downsample: (1, 1),
            average: true,
            median_kernel: None,
        };
        let out = pre.prepare(&CropRegion::none(), &options).unwrap();
        assert_eq!(out.dim(), (3, 1, 4));
        // mean of frames 1 and 4 at column 0
        assert_eq!(out[[0, 0, 0]], 250.0);
    }

    #[test]
    fn test_prepare_requires_enough_frames() {
        let stack = column_stack(4, 1, 4);
        let angles = AngleCalibrator::new(&stack, 2).unwrap().manual(3, 360).unwrap();
        let centre = CenterCalibration::centred();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);
        assert!(matches!(
            pre.prepare(&CropRegion::none(), &PreprocessOptions::default()),
            Err(TomoError::Bounds { .. })
        ));
    }

    #[test]
    fn test_prepare_downsamples() {
        let stack = column_stack(4, 4, 8);
        let angles = AngleCalibrator::new(&stack, 0).unwrap().manual(2, 180).unwrap();
        let centre = CenterCalibration::centred();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);

        let out = pre
            .prepare(&CropRegion::none(), &PreprocessOptions::default())
            .unwrap();
        assert_eq!(out.dim(), (2, 1, 2));
        // columns 0..4 of frame 0 -> mean 1.5
        assert!((out[[0, 0, 0]] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_rejects_even_median_kernel() {
        let stack = column_stack(4, 4, 8);
        let angles = AngleCalibrator::new(&stack, 0).unwrap().manual(2, 180).unwrap();
        let centre = CenterCalibration::centred();
        let pre = GeometryPreprocessor::new(&stack, &angles, &centre);
        let options = PreprocessOptions {
            median_kernel: Some(4),
            ..Default::default()
        };
        assert!(matches!(
            pre.prepare(&CropRegion::none(), &options),
            Err(TomoError::Config(_))
        ));
    }
}
