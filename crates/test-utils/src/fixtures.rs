//! Canonical phantoms shared by the integration suites.

use crate::generators::{Band, Disk, RotatingPhantom};

/// Reference frame used by the end-to-end scenarios.
pub const REFERENCE_FRAME: usize = 5;

/// Frames per revolution of [`two_band_phantom`].
pub const TWO_BAND_PERIOD: usize = 72;

/// Frames captured of [`two_band_phantom`]: a warm-up, two whole
/// revolutions and a few trailing frames.
pub const TWO_BAND_FRAMES: usize = REFERENCE_FRAME + 2 * TWO_BAND_PERIOD + 5;

/// Upper band disk, relative to the axis.
pub const UPPER_DISK: Disk = Disk {
    x: 10.0,
    y: -6.0,
    radius: 8.0,
    attenuation: 1.0,
};

/// Lower band disk, relative to the axis.
pub const LOWER_DISK: Disk = Disk {
    x: -9.0,
    y: 9.0,
    radius: 6.0,
    attenuation: 1.0,
};

/// Rows in each band of [`two_band_phantom`].
pub const BAND_ROWS: usize = 8;

/// A 63-pixel-wide specimen on a centred axis, upper rows holding one
/// off-axis disk and lower rows another, at 0 degrees on
/// [`REFERENCE_FRAME`].
///
/// The two disks sit at different bearings so no frame other than a whole
/// revolution reproduces the reference view.
pub fn two_band_phantom() -> RotatingPhantom {
    RotatingPhantom {
        width: 63,
        period: TWO_BAND_PERIOD,
        zero_frame: REFERENCE_FRAME,
        axis_offset: 0.0,
        bands: vec![
            Band {
                rows: BAND_ROWS,
                disks: vec![UPPER_DISK],
            },
            Band {
                rows: BAND_ROWS,
                disks: vec![LOWER_DISK],
            },
        ],
    }
}

/// [`two_band_phantom`] with the rotation axis displaced by `offset` pixels.
pub fn shifted_axis_phantom(offset: f64) -> RotatingPhantom {
    RotatingPhantom {
        width: 64,
        axis_offset: offset,
        ..two_band_phantom()
    }
}
