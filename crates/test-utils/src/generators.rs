//! Synthetic projection generators.
//!
//! Projections are computed analytically as parallel-beam transmission
//! through absorbing disks, so calibration and reconstruction results can be
//! checked against known geometry.

use ndarray::Array2;

/// An absorbing disk in a horizontal slice of the specimen.
///
/// Coordinates are in pixels relative to the rotation axis; `x` runs along
/// detector columns and `y` along the slice depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    /// Absorption per pixel of path length.
    pub attenuation: f64,
}

impl Disk {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self {
            x,
            y,
            radius,
            attenuation: 1.0,
        }
    }

    /// Path length through the disk along the ray at detector offset `t`
    /// for a specimen turned by `angle` degrees.
    pub fn chord(&self, angle: f64, t: f64) -> f64 {
        let (sin, cos) = angle.to_radians().sin_cos();
        let centre = self.x * cos - self.y * sin;
        let s = t - centre;
        let r2 = self.radius * self.radius - s * s;
        if r2 > 0.0 {
            2.0 * r2.sqrt()
        } else {
            0.0
        }
    }
}

/// A run of detector rows that all see the same set of disks.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub rows: usize,
    pub disks: Vec<Disk>,
}

/// A specimen turning at constant speed in front of the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct RotatingPhantom {
    pub width: usize,
    /// Frames per full revolution.
    pub period: usize,
    /// Frame at which the specimen is at 0 degrees.
    pub zero_frame: usize,
    /// Axis displacement from the middle of the detector, `(width - 1) / 2`.
    pub axis_offset: f64,
    pub bands: Vec<Band>,
}

impl RotatingPhantom {
    pub fn height(&self) -> usize {
        self.bands.iter().map(|b| b.rows).sum()
    }

    /// Rotation of the specimen in degrees at `frame`.
    pub fn angle(&self, frame: usize) -> f64 {
        360.0 * (frame as f64 - self.zero_frame as f64) / self.period as f64
    }

    /// Detector column of the rotation axis.
    pub fn axis(&self) -> f64 {
        (self.width as f64 - 1.0) / 2.0 + self.axis_offset
    }

    /// Transmission image at `frame`, values in `(0, 1]`.
    pub fn frame(&self, frame: usize) -> Array2<f32> {
        let angle = self.angle(frame);
        let axis = self.axis();
        let mut image = Array2::<f32>::zeros((self.height(), self.width));

        let mut row = 0;
        for band in &self.bands {
            let profile: Vec<f32> = (0..self.width)
                .map(|col| {
                    let t = col as f64 - axis;
                    let absorption: f64 = band
                        .disks
                        .iter()
                        .map(|d| d.attenuation * d.chord(angle, t))
                        .sum();
                    (-absorption).exp() as f32
                })
                .collect();

            for r in row..row + band.rows {
                for (col, value) in profile.iter().enumerate() {
                    image[[r, col]] = *value;
                }
            }
            row += band.rows;
        }
        image
    }

    /// The first `count` frames.
    pub fn frames(&self, count: usize) -> Vec<Array2<f32>> {
        (0..count).map(|i| self.frame(i)).collect()
    }
}

/// A stack with an exact period of `period` frames and distinct frames in
/// between.
pub fn periodic_frames(count: usize, period: usize, height: usize, width: usize) -> Vec<Array2<f32>> {
    let phantom = RotatingPhantom {
        width,
        period,
        zero_frame: 0,
        axis_offset: 0.0,
        bands: vec![Band {
            rows: height,
            disks: vec![
                Disk::new(width as f64 / 6.0, -(width as f64) / 10.0, width as f64 / 8.0),
                Disk::new(-(width as f64) / 7.0, width as f64 / 7.0, width as f64 / 12.0),
            ],
        }],
    };
    phantom.frames(count)
}

/// A frame mirror-symmetric about column `axis`.
pub fn mirror_symmetric_frame(height: usize, width: usize, axis: f64) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(row, col)| {
        let d = col as f64 - axis;
        let bump = (-(d * d) / 18.0).exp();
        let core = if d.abs() < 2.0 { 0.5 } else { 0.0 };
        (bump + core) as f32 * (1.0 + row as f32 * 0.01)
    })
}

/// Transmission sinogram of a disk of `radius` centred on the axis.
///
/// Every view is identical: transmission 0.1 strictly inside the disk
/// shadow (`|u - width/2| < radius`) and 1 elsewhere, including the columns
/// exactly `radius` from the centre.
pub fn centred_disk_sinogram(views: usize, width: usize, radius: usize) -> Array2<f32> {
    let centre = (width / 2) as isize;
    Array2::from_shape_fn((views, width), |(_, u)| {
        if (u as isize - centre).unsigned_abs() < radius {
            0.1
        } else {
            1.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_through_centre() {
        let disk = Disk::new(0.0, 0.0, 5.0);
        assert!((disk.chord(0.0, 0.0) - 10.0).abs() < 1e-12);
        assert!((disk.chord(37.0, 3.0) - 8.0).abs() < 1e-12);
        assert_eq!(disk.chord(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_phantom_is_periodic() {
        let phantom = RotatingPhantom {
            width: 31,
            period: 12,
            zero_frame: 3,
            axis_offset: 0.0,
            bands: vec![Band {
                rows: 2,
                disks: vec![Disk::new(6.0, -2.0, 3.0)],
            }],
        };
        let a = phantom.frame(3);
        let b = phantom.frame(15);
        let c = phantom.frame(4);
        let diff = |x: &Array2<f32>, y: &Array2<f32>| {
            x.iter().zip(y.iter()).map(|(p, q)| (p - q).abs()).fold(0.0f32, f32::max)
        };
        assert!(diff(&a, &b) < 1e-5);
        assert!(diff(&a, &c) > 1e-2);
    }

    #[test]
    fn test_opposite_view_is_mirrored() {
        let phantom = RotatingPhantom {
            width: 41,
            period: 20,
            zero_frame: 0,
            axis_offset: 3.0,
            bands: vec![Band {
                rows: 1,
                disks: vec![Disk::new(5.0, 4.0, 4.0)],
            }],
        };
        let front = phantom.frame(2);
        let back = phantom.frame(12);
        let axis = phantom.axis() as i64;
        for offset in 0..15i64 {
            let l = (axis - offset) as usize;
            let r = (axis + offset) as usize;
            assert!((front[[0, l]] - back[[0, r]]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mirror_symmetric_frame() {
        let frame = mirror_symmetric_frame(3, 20, 9.5);
        for c in 0..10 {
            assert_eq!(frame[[1, c]], frame[[1, 19 - c]]);
        }
    }

    #[test]
    fn test_centred_disk_sinogram() {
        let sino = centred_disk_sinogram(4, 16, 3);
        assert_eq!(sino.dim(), (4, 16));
        assert_eq!(sino[[0, 8]], 0.1);
        assert_eq!(sino[[0, 10]], 0.1);
        assert_eq!(sino[[0, 11]], 1.0);
    }

    #[test]
    fn test_centred_disk_shadow_excludes_edge() {
        let sino = centred_disk_sinogram(3, 64, 20);
        for view in 0..3 {
            // |u - 32| == 20 on both sides is background
            assert_eq!(sino[[view, 12]], 1.0);
            assert_eq!(sino[[view, 52]], 1.0);
            assert_eq!(sino[[view, 13]], 0.1);
            assert_eq!(sino[[view, 51]], 0.1);
        }
        let foreground = sino.row(0).iter().filter(|v| **v < 1.0).count();
        assert_eq!(foreground, 2 * 20 - 1);
    }
}
