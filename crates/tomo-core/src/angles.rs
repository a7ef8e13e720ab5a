//! Rotation-period detection and the per-frame angle sequence.
//!
//! The automatic search compares every frame after the reference frame
//! `p0` with `p0` itself. The standard deviation of the pixel-wise
//! difference drops back towards zero when the specimen returns to its
//! starting orientation, so the first sufficiently isolated local minimum
//! of that curve marks one full revolution.
//!
//! Frame `p0 + num_images - 1` is the 360° view: a true period of `P`
//! frames gives `num_images = P + 1` with the default frame-count offset.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TomoError};
use crate::filters::{linspace, std_of_difference};
use crate::operator::{Operator, OperatorRequest};
use crate::stack::ProjectionStack;

/// Angular span covered by a calibrated set of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AngularRange {
    /// 0 to 180 degrees.
    Half,
    /// 0 to 360 degrees.
    #[default]
    Full,
}

impl AngularRange {
    /// Parse a span in degrees; only 180 and 360 are accepted.
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees {
            180 => Ok(Self::Half),
            360 => Ok(Self::Full),
            other => Err(TomoError::InvalidRange(other)),
        }
    }

    pub fn degrees(&self) -> f64 {
        match self {
            Self::Half => 180.0,
            Self::Full => 360.0,
        }
    }
}

/// Parameters of the automatic rotation-period search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodSearchConfig {
    /// Estimated number of frames in one revolution. Half of it is the
    /// window within which a minimum must be the lowest value.
    pub est_nproj: usize,

    /// Added to the index of the first minimum to give `num_images`.
    pub frame_count_offset: usize,
}

impl PeriodSearchConfig {
    pub fn new(est_nproj: usize) -> Self {
        Self {
            est_nproj,
            frame_count_offset: 1,
        }
    }

    /// Half-width of the local-minimum window.
    pub fn order(&self) -> usize {
        self.est_nproj / 2
    }
}

/// Difference curve and minima found by the automatic search.
///
/// Indices are offsets from the reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSearch {
    pub curve: Vec<f64>,
    pub minima: Vec<usize>,
}

/// Frames-per-revolution and the angle of each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleCalibration {
    reference_index: usize,
    num_images: usize,
    range: AngularRange,
    angles: Vec<f64>,
    search: Option<PeriodSearch>,
}

impl AngleCalibration {
    /// First trustworthy frame (p0).
    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    /// Frames making up the calibrated angular range.
    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn range(&self) -> AngularRange {
        self.range
    }

    /// Angle of each calibrated frame in degrees, starting at 0.
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Diagnostics from the automatic search, if it was used.
    pub fn search(&self) -> Option<&PeriodSearch> {
        self.search.as_ref()
    }

    /// Calibration with explicit angles, e.g. read back from a saved volume.
    pub fn from_parts(reference_index: usize, range: AngularRange, angles: Vec<f64>) -> Result<Self> {
        if angles.is_empty() {
            return Err(TomoError::calibration("angle sequence is empty"));
        }
        if angles[0] != 0.0 {
            return Err(TomoError::calibration(format!(
                "angle sequence must start at 0, starts at {}",
                angles[0]
            )));
        }
        Ok(Self {
            reference_index,
            num_images: angles.len(),
            range,
            angles,
            search: None,
        })
    }
}

/// Derives an [`AngleCalibration`] from a projection stack.
#[derive(Debug, Clone, Copy)]
pub struct AngleCalibrator<'a> {
    stack: &'a ProjectionStack,
    reference_index: usize,
}

impl<'a> AngleCalibrator<'a> {
    /// Calibrator using frame `reference_index` (p0) as the 0° view.
    pub fn new(stack: &'a ProjectionStack, reference_index: usize) -> Result<Self> {
        if reference_index >= stack.frame_count() {
            return Err(TomoError::bounds(
                format!("reference frame {}", reference_index),
                format!("{} frames", stack.frame_count()),
            ));
        }
        Ok(Self {
            stack,
            reference_index,
        })
    }

    /// Operator-supplied frame count and angular range.
    pub fn manual(&self, num_images: usize, ang_range: u32) -> Result<AngleCalibration> {
        let range = AngularRange::from_degrees(ang_range)?;
        if num_images == 0 {
            return Err(TomoError::calibration("num_images must be positive"));
        }

        info!(num_images, ang_range, "Angles set manually");
        Ok(AngleCalibration {
            reference_index: self.reference_index,
            num_images,
            range,
            angles: linspace(0.0, range.degrees(), num_images),
            search: None,
        })
    }

    /// Locate the 360° frame from the difference curve.
    ///
    /// The first strict relative minimum of order `est_nproj / 2` is taken,
    /// so `est_nproj` must lie in `P..2P` for a true period `P`. At `2P` or
    /// more the window around `P` reaches the zero at the reference frame
    /// and no minimum qualifies. A much smaller estimate can stop at a
    /// mid-rotation dip and return too few images.
    pub fn automatic(&self, config: &PeriodSearchConfig) -> Result<AngleCalibration> {
        let order = config.order();
        if order == 0 {
            return Err(TomoError::calibration(format!(
                "est_nproj {} gives an empty search window",
                config.est_nproj
            )));
        }

        let curve = self.difference_curve()?;
        let minima = relative_minima(&curve, order);
        debug!(curve_len = curve.len(), order, minima = ?minima, "Difference curve minima");

        let first = *minima.first().ok_or_else(|| {
            TomoError::calibration(format!(
                "no local minimum within {} frames after frame {}; \
                 check a full rotation was captured or adjust est_nproj",
                curve.len(),
                self.reference_index
            ))
        })?;

        let num_images = first + config.frame_count_offset;
        if num_images == 0 {
            return Err(TomoError::calibration("detected an empty rotation"));
        }
        let angles = linspace(0.0, 360.0, num_images)
            .into_iter()
            .map(f64::trunc)
            .collect();

        info!(
            num_images,
            reference_index = self.reference_index,
            "Detected images in a 360 degree rotation"
        );

        Ok(AngleCalibration {
            reference_index: self.reference_index,
            num_images,
            range: AngularRange::Full,
            angles,
            search: Some(PeriodSearch { curve, minima }),
        })
    }

    /// Ask the operator which frame completes the first full rotation.
    pub fn interactive(&self, operator: &mut dyn Operator) -> Result<AngleCalibration> {
        let last = self.stack.frame_count() - 1;
        if last <= self.reference_index {
            return Err(TomoError::bounds(
                format!("frames after reference {}", self.reference_index),
                format!("{} frames", self.stack.frame_count()),
            ));
        }

        let request = OperatorRequest::new(
            format!("Frame index at 360 degrees from frame {}", self.reference_index),
            self.reference_index as i64 + 1,
            last as i64,
        );
        let index = request.validate(operator.ask(&request)?)? as usize;
        let num_images = index - self.reference_index + 1;

        info!(index, num_images, "Angles set interactively");
        Ok(AngleCalibration {
            reference_index: self.reference_index,
            num_images,
            range: AngularRange::Full,
            angles: linspace(0.0, 360.0, num_images),
            search: None,
        })
    }

    /// Std of `frame[i] - frame[p0]` for every `i` from p0 to the last frame.
    pub fn difference_curve(&self) -> Result<Vec<f64>> {
        let reference = self.stack.frame(self.reference_index)?;
        (self.reference_index..self.stack.frame_count())
            .into_par_iter()
            .map(|i| -> Result<f64> { Ok(std_of_difference(self.stack.frame(i)?, reference)) })
            .collect()
    }
}

/// Indices that are strictly lower than every neighbour within `order`.
///
/// Neighbour indices past either end are clamped to the end, so the first
/// and last samples can never qualify.
pub fn relative_minima(curve: &[f64], order: usize) -> Vec<usize> {
    let n = curve.len();
    if n == 0 {
        return Vec::new();
    }

    (0..n)
        .filter(|&k| {
            (1..=order).all(|j| {
                let after = (k + j).min(n - 1);
                let before = k.saturating_sub(j);
                curve[k] < curve[after] && curve[k] < curve[before]
            })
        })
        .collect()
}
