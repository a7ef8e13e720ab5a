//! Run configuration for calibration and reconstruction.
//!
//! Values come from three layers, later ones winning: built-in defaults, a
//! YAML file, and `TOMO_*` environment variables. The command-line front
//! end applies its own flags on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::angles::{AngularRange, PeriodSearchConfig};
use crate::centre::CentreSearchConfig;
use crate::error::{Result, TomoError};
use crate::preprocess::{CropRegion, PreprocessOptions};
use crate::recon::ReconAlgorithm;

/// Configuration for one calibration and reconstruction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// First frame treated as trustworthy (p0).
    pub reference_index: usize,

    /// Estimated frames per revolution; enables automatic period detection.
    pub est_nproj: Option<usize>,

    /// Added to the first difference minimum to give the frame count.
    pub frame_count_offset: usize,

    /// Frame count for manual angle calibration.
    pub num_images: Option<usize>,

    /// Angular span of a manual calibration (180 or 360).
    pub ang_range: u32,

    /// Manual centre-of-rotation offset; automatic search when unset.
    pub cor_offset: Option<i64>,

    /// Width of the automatic centre search in pixels.
    pub window: usize,

    /// Local-mean reduction `(rows, cols)` used by the centre search.
    pub centre_downsample: (usize, usize),

    /// Local-mean reduction `(rows, cols)` applied before reconstruction.
    pub downsample: (usize, usize),

    pub crop: CropRegion,

    /// One of `fbp`, `sart` or `visualhulls`.
    pub recon_alg: String,

    pub sart_iters: usize,

    /// Visual-hull absorption threshold.
    pub threshold: f32,

    /// Crop slices to the square inside the reconstruction circle.
    pub crop_circle: bool,

    /// Average matching frames across all complete rotations.
    pub average: bool,

    /// Median-filter every frame before reconstruction.
    pub median_filter: bool,

    pub median_kernel: usize,

    /// Reconstruction worker threads; 0 uses every core.
    pub threads: usize,

    /// Extension of the input frame files.
    pub frame_extension: String,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            reference_index: 5,
            est_nproj: None,
            frame_count_offset: 1,
            num_images: None,
            ang_range: 360,
            cor_offset: None,
            window: 400,
            centre_downsample: (2, 1),
            downsample: (4, 4),
            crop: CropRegion::none(),
            recon_alg: "fbp".to_string(),
            sart_iters: 1,
            threshold: 0.5,
            crop_circle: false,
            average: false,
            median_filter: false,
            median_kernel: 9,
            threads: 0,
            frame_extension: "tif".to_string(),
        }
    }
}

impl ReconConfig {
    /// Load a YAML file. Missing keys keep their defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TomoError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Defaults overridden by `TOMO_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `TOMO_*` environment variables on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }
        fn flag(value: Option<String>) -> Option<bool> {
            value.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        }
        fn pair(value: Option<String>) -> Option<(usize, usize)> {
            let value = value?;
            let (a, b) = value.split_once(',')?;
            Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
        }

        if let Some(v) = parse(lookup("TOMO_REFERENCE_INDEX")) {
            self.reference_index = v;
        }
        if let Some(v) = parse(lookup("TOMO_EST_NPROJ")) {
            self.est_nproj = Some(v);
        }
        if let Some(v) = parse(lookup("TOMO_FRAME_COUNT_OFFSET")) {
            self.frame_count_offset = v;
        }
        if let Some(v) = parse(lookup("TOMO_NUM_IMAGES")) {
            self.num_images = Some(v);
        }
        if let Some(v) = parse(lookup("TOMO_ANG_RANGE")) {
            self.ang_range = v;
        }
        if let Some(v) = parse(lookup("TOMO_COR_OFFSET")) {
            self.cor_offset = Some(v);
        }
        if let Some(v) = parse(lookup("TOMO_WINDOW")) {
            self.window = v;
        }
        if let Some(v) = pair(lookup("TOMO_CENTRE_DOWNSAMPLE")) {
            self.centre_downsample = v;
        }
        if let Some(v) = pair(lookup("TOMO_DOWNSAMPLE")) {
            self.downsample = v;
        }
        if let Some(v) = lookup("TOMO_RECON_ALG") {
            self.recon_alg = v.trim().to_lowercase();
        }
        if let Some(v) = parse(lookup("TOMO_SART_ITERS")) {
            self.sart_iters = v;
        }
        if let Some(v) = parse(lookup("TOMO_THRESHOLD")) {
            self.threshold = v;
        }
        if let Some(v) = flag(lookup("TOMO_CROP_CIRCLE")) {
            self.crop_circle = v;
        }
        if let Some(v) = flag(lookup("TOMO_AVERAGE")) {
            self.average = v;
        }
        if let Some(v) = flag(lookup("TOMO_MEDIAN_FILTER")) {
            self.median_filter = v;
        }
        if let Some(v) = parse(lookup("TOMO_MEDIAN_KERNEL")) {
            self.median_kernel = v;
        }
        if let Some(v) = parse(lookup("TOMO_THREADS")) {
            self.threads = v;
        }
        if let Some(v) = lookup("TOMO_FRAME_EXTENSION") {
            self.frame_extension = v.trim().trim_start_matches('.').to_string();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        AngularRange::from_degrees(self.ang_range)?;
        self.algorithm()?.reconstructor()?;

        if self.num_images == Some(0) {
            return Err(TomoError::config("num_images must be > 0"));
        }
        if let Some(est) = self.est_nproj {
            if est < 2 {
                return Err(TomoError::config("est_nproj must be >= 2"));
            }
        }
        if self.window < 2 {
            return Err(TomoError::config("window must be >= 2"));
        }
        if self.downsample.0 == 0 || self.downsample.1 == 0 {
            return Err(TomoError::config("downsample factors must be > 0"));
        }
        if self.centre_downsample.0 == 0 || self.centre_downsample.1 == 0 {
            return Err(TomoError::config("centre_downsample factors must be > 0"));
        }
        if self.median_filter && self.median_kernel % 2 == 0 {
            return Err(TomoError::config("median_kernel must be odd"));
        }
        if self.frame_extension.is_empty() {
            return Err(TomoError::config("frame_extension must not be empty"));
        }

        Ok(())
    }

    /// Reconstruction algorithm named by `recon_alg`.
    pub fn algorithm(&self) -> Result<ReconAlgorithm> {
        ReconAlgorithm::from_name(&self.recon_alg, self.sart_iters, self.threshold)
    }

    /// Automatic period-search parameters, if `est_nproj` is set.
    pub fn period_search(&self) -> Option<PeriodSearchConfig> {
        self.est_nproj.map(|est_nproj| PeriodSearchConfig {
            est_nproj,
            frame_count_offset: self.frame_count_offset,
        })
    }

    pub fn centre_search(&self) -> CentreSearchConfig {
        CentreSearchConfig {
            window: self.window,
            downsample: self.centre_downsample,
        }
    }

    pub fn preprocess_options(&self) -> PreprocessOptions {
        PreprocessOptions {
            downsample: self.downsample,
            average: self.average,
            median_kernel: self.median_filter.then_some(self.median_kernel),
        }
    }
}
