//! Centre-of-rotation detection.
//!
//! The projection taken 180° after the reference frame is the mirror image
//! of the reference about the rotation axis. Flipping it left/right and
//! sliding both views against each other finds the shift at which they
//! agree best; that shift is the axis offset from the frame centre.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::angles::AngleCalibration;
use crate::error::{Result, TomoError};
use crate::filters::{downscale_local_mean, flip_lr, std_of_difference};
use crate::stack::ProjectionStack;

/// Parameters of the automatic centre search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentreSearchConfig {
    /// Full width of the searched offsets in pixels; offsets run over
    /// `[-window / 2, window / 2)`.
    pub window: usize,

    /// Local-mean reduction `(rows, cols)` applied to both views first.
    pub downsample: (usize, usize),
}

impl Default for CentreSearchConfig {
    fn default() -> Self {
        Self {
            window: 400,
            downsample: (2, 1),
        }
    }
}

/// Mismatch between the reference and the mirrored opposite view, per offset.
#[derive(Debug, Clone, PartialEq)]
pub struct CentreSearch {
    pub offsets: Vec<i64>,
    pub curve: Vec<f64>,
}

/// Signed offset of the rotation axis from the geometric frame centre.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterCalibration {
    cor_offset: i64,
    search: Option<CentreSearch>,
}

impl CenterCalibration {
    /// A centred rotation axis.
    pub fn centred() -> Self {
        Self {
            cor_offset: 0,
            search: None,
        }
    }

    /// Axis offset in pixels; positive means right of centre.
    pub fn cor_offset(&self) -> i64 {
        self.cor_offset
    }

    /// Columns to remove so the axis lands in the middle of the frame.
    pub fn trim_columns(&self) -> usize {
        2 * self.cor_offset.unsigned_abs() as usize
    }

    pub fn search(&self) -> Option<&CentreSearch> {
        self.search.as_ref()
    }

    /// Check `|cor_offset| < width / 2`.
    pub fn validate(&self, width: usize) -> Result<()> {
        if self.trim_columns() >= width {
            return Err(TomoError::bounds(
                format!("centre offset {}", self.cor_offset),
                format!("frame width {}", width),
            ));
        }
        Ok(())
    }
}

/// Derives a [`CenterCalibration`] for a calibrated stack.
#[derive(Debug, Clone, Copy)]
pub struct CenterCalibrator<'a> {
    stack: &'a ProjectionStack,
    angles: &'a AngleCalibration,
}

impl<'a> CenterCalibrator<'a> {
    pub fn new(stack: &'a ProjectionStack, angles: &'a AngleCalibration) -> Self {
        Self { stack, angles }
    }

    /// Operator-supplied offset.
    pub fn manual(&self, cor_offset: i64) -> Result<CenterCalibration> {
        let calibration = CenterCalibration {
            cor_offset,
            search: None,
        };
        calibration.validate(self.stack.width())?;
        info!(cor_offset, "Centre of rotation set manually");
        Ok(calibration)
    }

    /// Find the offset at which the mirrored 180° view best matches the reference.
    pub fn automatic(&self, config: &CentreSearchConfig) -> Result<CenterCalibration> {
        let p0 = self.angles.reference_index();
        let opposite = p0 + self.angles.num_images() / 2;
        if opposite >= self.stack.frame_count() {
            return Err(TomoError::calibration(format!(
                "opposite frame {} is past the end of a {}-frame stack",
                opposite,
                self.stack.frame_count()
            )));
        }

        let (dy, dx) = (config.downsample.0.max(1), config.downsample.1.max(1));
        let reference = downscale_local_mean(self.stack.frame(p0)?, (dy, dx));
        let flipped = flip_lr(downscale_local_mean(self.stack.frame(opposite)?, (dy, dx)).view());

        let width = reference.ncols();
        let half = (config.window / 2 / dx) as i64;
        if half == 0 || 2 * half as usize >= width {
            return Err(TomoError::calibration(format!(
                "centre search window {} does not fit frame width {}",
                config.window,
                self.stack.width()
            )));
        }

        let w = width as i64;
        let mut offsets = Vec::with_capacity(2 * half as usize);
        let mut curve = Vec::with_capacity(2 * half as usize);
        for o in -half..half {
            let ref_cols = ((half + o) as usize)..((w - half + o) as usize);
            let flip_cols = ((half - o) as usize)..((w - half - o) as usize);
            let diff = std_of_difference(
                reference.slice(ndarray::s![.., ref_cols]),
                flipped.slice(ndarray::s![.., flip_cols]),
            );
            offsets.push(o);
            curve.push(diff);
        }

        let best = first_argmin(&curve)
            .ok_or_else(|| TomoError::calibration("centre search produced no samples"))?;
        let cor_offset = offsets[best] * dx as i64;
        debug!(best_std = curve[best], samples = curve.len(), "Centre search curve");

        let calibration = CenterCalibration {
            cor_offset,
            search: Some(CentreSearch { offsets, curve }),
        };
        calibration.validate(self.stack.width())?;

        info!(cor_offset, opposite_frame = opposite, "Detected centre of rotation");
        Ok(calibration)
    }
}

/// Index of the first smallest value.
fn first_argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, value) in values.iter().enumerate() {
        match best {
            Some(b) if !(*value < values[b]) => {}
            _ => best = Some(idx),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::AngleCalibrator;
    use ndarray::Array2;

    fn symmetric_frame(height: usize, width: usize, axis: f64) -> Array2<f32> {
        Array2::from_shape_fn((height, width), |(_, c)| {
            let d = c as f64 - axis;
            (-(d * d) / 18.0).exp() as f32 + if d.abs() < 2.0 { 0.5 } else { 0.0 }
        })
    }

    #[test]
    fn test_first_argmin_takes_first() {
        assert_eq!(first_argmin(&[3.0, 1.0, 2.0, 1.0]), Some(1));
        assert_eq!(first_argmin(&[]), None);
    }

    #[test]
    fn test_manual_offset_bounds() {
        let stack = ProjectionStack::from_frames(vec![Array2::zeros((4, 20)); 4]).unwrap();
        let angles = AngleCalibrator::new(&stack, 0).unwrap().manual(4, 360).unwrap();
        let calibrator = CenterCalibrator::new(&stack, &angles);

        assert_eq!(calibrator.manual(9).unwrap().trim_columns(), 18);
        assert!(matches!(calibrator.manual(10), Err(TomoError::Bounds { .. })));
        assert!(matches!(calibrator.manual(-10), Err(TomoError::Bounds { .. })));
    }

    #[test]
    fn test_automatic_recovers_shifted_axis() {
        let width = 64;
        for delta in [-5i64, 0, 3, 7] {
            let axis = (width as f64 - 1.0) / 2.0 + delta as f64;
            let frames = vec![symmetric_frame(8, width, axis); 6];
            let stack = ProjectionStack::from_frames(frames).unwrap();
            let angles = AngleCalibrator::new(&stack, 1).unwrap().manual(4, 360).unwrap();

            let config = CentreSearchConfig {
                window: 20,
                downsample: (2, 1),
            };
            let cal = CenterCalibrator::new(&stack, &angles).automatic(&config).unwrap();
            assert_eq!(cal.cor_offset(), delta, "axis shifted by {}", delta);
            assert_eq!(cal.search().unwrap().curve.len(), 20);
        }
    }

    #[test]
    fn test_automatic_rejects_oversized_window() {
        let stack = ProjectionStack::from_frames(vec![Array2::zeros((4, 16)); 6]).unwrap();
        let angles = AngleCalibrator::new(&stack, 0).unwrap().manual(4, 360).unwrap();
        let config = CentreSearchConfig {
            window: 16,
            downsample: (1, 1),
        };
        assert!(matches!(
            CenterCalibrator::new(&stack, &angles).automatic(&config),
            Err(TomoError::Calibration(_))
        ));
    }

    #[test]
    fn test_automatic_requires_opposite_frame() {
        let stack = ProjectionStack::from_frames(vec![Array2::zeros((4, 16)); 6]).unwrap();
        let angles = AngleCalibrator::new(&stack, 4).unwrap().manual(8, 360).unwrap();
        assert!(matches!(
            CenterCalibrator::new(&stack, &angles).automatic(&CentreSearchConfig {
                window: 4,
                downsample: (1, 1),
            }),
            Err(TomoError::Calibration(_))
        ));
    }
}
