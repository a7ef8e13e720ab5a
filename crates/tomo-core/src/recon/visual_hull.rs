//! Shape-from-silhouette reconstruction of a single slice.
//!
//! Every view is reduced to a binary silhouette. A cell of the output
//! square is penalised once for every view in which its ray lands on
//! background, so cells inside every silhouette keep the highest score and
//! are the only ones that survive the final threshold.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::SliceReconstructor;
use crate::error::{Result, TomoError};
use crate::filters::median_filter_reflect;

/// Added to transmission before taking the logarithm.
const LOG_EPSILON: f32 = 1e-8;

/// Visual-hull (space carving) slice reconstructor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualHull {
    /// Absorption above which a detector pixel is foreground.
    pub threshold: f32,

    /// The accumulator range divided by this is added back before the
    /// final cut-off.
    pub bias_divisor: f32,

    /// Width of the median filter applied to the silhouettes.
    pub median_size: usize,
}

impl Default for VisualHull {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            bias_divisor: 4.0,
            median_size: 2,
        }
    }
}

impl VisualHull {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Binary silhouettes `(view, detector)` of a transmission sinogram.
    pub fn silhouettes(&self, sinogram: ArrayView2<'_, f32>) -> Array2<f32> {
        let mask = sinogram.mapv(|t| {
            let absorption = -(t + LOG_EPSILON).ln();
            if absorption > self.threshold {
                1.0
            } else {
                0.0
            }
        });
        median_filter_reflect(mask.view(), self.median_size)
    }
}

impl SliceReconstructor for VisualHull {
    fn name(&self) -> &'static str {
        "visualhulls"
    }

    fn reconstruct(&self, sinogram: ArrayView2<'_, f32>, angles: &[f64]) -> Result<Array2<f32>> {
        let (views, width) = sinogram.dim();
        if views != angles.len() {
            return Err(TomoError::shape_mismatch(
                format!("{} sinogram rows", angles.len()),
                format!("{} rows", views),
            ));
        }

        let silhouettes = self.silhouettes(sinogram);
        let centre = (width / 2) as isize;
        let last = width as isize - 1;
        let mut hull = Array2::<f32>::ones((width, width));

        for (view, angle) in angles.iter().enumerate() {
            let (sin, cos) = angle.to_radians().sin_cos();
            let silhouette = silhouettes.row(view);

            for ((row, col), cell) in hull.indexed_iter_mut() {
                let x = col as f64 - centre as f64;
                let y = row as f64 - centre as f64;
                let u = ((x * cos - y * sin) as isize + centre).clamp(0, last) as usize;
                *cell -= 1.0 - silhouette[u];
            }
        }

        let (min, max) = hull
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let bias = ((max - min) / self.bias_divisor).floor();
        hull.mapv_inplace(|v| {
            let v = v + bias;
            if v < 0.5 {
                0.0
            } else {
                v
            }
        });

        Ok(hull)
    }
}
