//! Radon-inversion reconstructors: unfiltered backprojection and SART.
//!
//! Both operate on a square grid whose side equals the detector width, with
//! the rotation axis at column `width / 2`. A grid cell at `(x, y)` relative
//! to the axis is seen by detector coordinate `x cos θ - y sin θ`. Cells
//! outside the inscribed circle are left at zero.

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::SliceReconstructor;
use crate::error::{Result, TomoError};

/// Detector geometry for one reconstruction grid.
#[derive(Debug, Clone)]
struct Geometry {
    width: usize,
    centre: f64,
    radius_sq: f64,
    /// `(sin θ, cos θ)` per view.
    trig: Vec<(f64, f64)>,
}

impl Geometry {
    fn new(sinogram: ArrayView2<'_, f32>, angles: &[f64]) -> Result<Self> {
        let (views, width) = sinogram.dim();
        if views != angles.len() {
            return Err(TomoError::shape_mismatch(
                format!("{} sinogram rows", angles.len()),
                format!("{} rows", views),
            ));
        }
        if width == 0 {
            return Err(TomoError::input("sinogram has no detector columns"));
        }

        let radius = (width / 2) as f64;
        Ok(Self {
            width,
            centre: (width / 2) as f64,
            radius_sq: radius * radius,
            trig: angles.iter().map(|a| a.to_radians().sin_cos()).collect(),
        })
    }

    fn inside(&self, row: usize, col: usize) -> bool {
        let (x, y) = self.offsets(row, col);
        x * x + y * y <= self.radius_sq
    }

    fn offsets(&self, row: usize, col: usize) -> (f64, f64) {
        (col as f64 - self.centre, row as f64 - self.centre)
    }

    /// Lower detector bin and the weight of the bin above it, or `None` when
    /// the ray misses the detector.
    fn detector_position(&self, view: usize, row: usize, col: usize) -> Option<(usize, f64)> {
        let (sin, cos) = self.trig[view];
        let (x, y) = self.offsets(row, col);
        let t = x * cos - y * sin + self.centre;
        if t < 0.0 || t > (self.width - 1) as f64 {
            return None;
        }
        let lower = t.floor();
        Some((lower as usize, t - lower))
    }
}

/// Sample a detector row at `(lower, frac)` by linear interpolation.
#[inline]
fn interpolate(row: ndarray::ArrayView1<'_, f32>, lower: usize, frac: f64) -> f64 {
    let a = row[lower] as f64;
    if frac == 0.0 || lower + 1 >= row.len() {
        return a;
    }
    a + (row[lower + 1] as f64 - a) * frac
}

/// Project `image` onto the detector for one view.
///
/// `weight` receives the summed interpolation weight of each detector bin,
/// i.e. the discrete ray length through the reconstruction circle.
fn forward_project(
    geometry: &Geometry,
    image: &Array2<f64>,
    view: usize,
    estimate: &mut Array1<f64>,
    weight: &mut Array1<f64>,
) {
    let width = geometry.width;
    estimate.fill(0.0);
    weight.fill(0.0);

    for ((row, col), cell) in image.indexed_iter() {
        if !geometry.inside(row, col) {
            continue;
        }
        if let Some((lower, frac)) = geometry.detector_position(view, row, col) {
            estimate[lower] += cell * (1.0 - frac);
            weight[lower] += 1.0 - frac;
            if lower + 1 < width {
                estimate[lower + 1] += cell * frac;
                weight[lower + 1] += frac;
            }
        }
    }
}

/// Unfiltered backprojection over the full set of views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Backprojection;

impl SliceReconstructor for Backprojection {
    fn name(&self) -> &'static str {
        "fbp"
    }

    fn reconstruct(&self, sinogram: ArrayView2<'_, f32>, angles: &[f64]) -> Result<Array2<f32>> {
        let geometry = Geometry::new(sinogram, angles)?;
        let mut image = Array2::<f64>::zeros((geometry.width, geometry.width));

        for view in 0..angles.len() {
            let projection = sinogram.row(view);
            for ((row, col), cell) in image.indexed_iter_mut() {
                if !geometry.inside(row, col) {
                    continue;
                }
                if let Some((lower, frac)) = geometry.detector_position(view, row, col) {
                    *cell += interpolate(projection, lower, frac);
                }
            }
        }

        let scale = PI / (2.0 * angles.len().max(1) as f64);
        Ok(image.mapv(|v| (v * scale) as f32))
    }
}

/// Simultaneous algebraic reconstruction.
///
/// Each iteration sweeps every view once; the image carries over between
/// iterations so later passes refine the earlier estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sart {
    pub iterations: usize,
    pub relaxation: f64,
}

impl Default for Sart {
    fn default() -> Self {
        Self {
            iterations: 1,
            relaxation: 0.15,
        }
    }
}

impl Sart {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            ..Default::default()
        }
    }

    /// Run one sweep over every view, updating `image` in place.
    fn sweep(&self, geometry: &Geometry, sinogram: ArrayView2<'_, f32>, image: &mut Array2<f64>) {
        let width = geometry.width;
        let mut estimate = Array1::<f64>::zeros(width);
        let mut weight = Array1::<f64>::zeros(width);

        for view in 0..geometry.trig.len() {
            forward_project(geometry, image, view, &mut estimate, &mut weight);

            let measured = sinogram.row(view);
            let correction: Array1<f64> = Array1::from_shape_fn(width, |u| {
                if weight[u] > 0.0 {
                    (measured[u] as f64 - estimate[u]) / weight[u]
                } else {
                    0.0
                }
            });

            // Backproject the normalised residual
            for ((row, col), cell) in image.indexed_iter_mut() {
                if !geometry.inside(row, col) {
                    continue;
                }
                if let Some((lower, frac)) = geometry.detector_position(view, row, col) {
                    let mut delta = correction[lower] * (1.0 - frac);
                    if lower + 1 < width {
                        delta += correction[lower + 1] * frac;
                    }
                    *cell += self.relaxation * delta;
                }
            }
        }
    }
}

impl SliceReconstructor for Sart {
    fn name(&self) -> &'static str {
        "sart"
    }

    fn reconstruct(&self, sinogram: ArrayView2<'_, f32>, angles: &[f64]) -> Result<Array2<f32>> {
        let geometry = Geometry::new(sinogram, angles)?;
        let mut image = Array2::<f64>::zeros((geometry.width, geometry.width));

        for _ in 0..self.iterations.max(1) {
            self.sweep(&geometry, sinogram, &mut image);
        }

        Ok(image.mapv(|v| v as f32))
    }
}
