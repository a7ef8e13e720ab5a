//! Rotational CT reconstruction command.
//!
//! Loads a directory of projection frames, calibrates the rotation period
//! and axis, reconstructs one slice per detector row and writes the slices
//! (and a Zarr volume) to a `reconstruction/` directory beside the input.

mod terminal;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use tomo_core::{
    AngleCalibration, AngleCalibrator, CancellationToken, CenterCalibration, CenterCalibrator,
    FrameSource, GeometryPreprocessor, LoggingProgress, ProjectionStack, ReconConfig,
    ReconstructionOrchestrator,
};
use tomo_io::{DirectoryFrameSource, SliceWriter, VolumeCompression, VolumeMetadata, VolumeWriter};

use terminal::TerminalOperator;

const HISTOGRAM_BINS: usize = 255;

#[derive(Parser, Debug)]
#[command(name = "tomo-recon")]
#[command(about = "Calibrate and reconstruct a rotational CT frame series")]
struct Args {
    /// Directory containing the projection frames
    input: PathBuf,

    /// YAML configuration file
    #[arg(short, long, env = "TOMO_CONFIG")]
    config: Option<PathBuf>,

    /// Frame taken as 0 degrees
    #[arg(long)]
    reference_index: Option<usize>,

    /// Rough frames per revolution for automatic period detection
    #[arg(long)]
    est_nproj: Option<usize>,

    /// Frames from the reference up to the closing view (skips detection)
    #[arg(long)]
    num_images: Option<usize>,

    /// Angular range covered by `num_images` (180 or 360)
    #[arg(long)]
    ang_range: Option<u32>,

    /// Rotation axis offset in pixels (skips detection)
    #[arg(long, allow_hyphen_values = true)]
    cor_offset: Option<i64>,

    /// Reconstruction algorithm: fbp, sart or visualhulls
    #[arg(long)]
    recon_alg: Option<String>,

    /// Worker threads for reconstruction (0 = all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Crop slices to the square inside the reconstruction circle
    #[arg(long)]
    crop_circle: bool,

    /// Ask for the closing frame on the terminal instead of detecting it
    #[arg(long)]
    interactive: bool,

    /// Skip writing volume.zarr
    #[arg(long)]
    no_volume: bool,

    /// Blosc/Zstd level for volume.zarr (uncompressed when unset)
    #[arg(long)]
    compression_level: Option<u8>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    /// File, then `TOMO_*` environment, then command-line flags.
    fn load_config(&self) -> Result<ReconConfig> {
        let base = match &self.config {
            Some(path) => ReconConfig::from_yaml(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ReconConfig::default(),
        };
        let mut config = base.with_env_overrides();

        if let Some(v) = self.reference_index {
            config.reference_index = v;
        }
        if let Some(v) = self.est_nproj {
            config.est_nproj = Some(v);
        }
        if let Some(v) = self.num_images {
            config.num_images = Some(v);
        }
        if let Some(v) = self.ang_range {
            config.ang_range = v;
        }
        if let Some(v) = self.cor_offset {
            config.cor_offset = Some(v);
        }
        if let Some(v) = &self.recon_alg {
            config.recon_alg = v.to_lowercase();
        }
        if let Some(v) = self.threads {
            config.threads = v;
        }
        if self.crop_circle {
            config.crop_circle = true;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let config = args.load_config()?;
    info!(
        input = %args.input.display(),
        recon_alg = %config.recon_alg,
        reference_index = config.reference_index,
        "Starting reconstruction"
    );
    let started = Instant::now();

    let mut source = DirectoryFrameSource::new(&args.input, &config.frame_extension);
    let stack = source
        .load()
        .with_context(|| format!("failed to load frames from {}", args.input.display()))?;

    let histogram = stack.histogram(config.reference_index, HISTOGRAM_BINS)?;
    debug!(
        min = histogram.min,
        max = histogram.max,
        counts = ?histogram.counts,
        "Reference frame histogram"
    );

    let angles = calibrate_angles(&stack, &config, args.interactive)?;
    let centre = calibrate_centre(&stack, &angles, &config)?;

    let prepared = GeometryPreprocessor::new(&stack, &angles, &centre)
        .prepare(&config.crop, &config.preprocess_options())
        .context("preprocessing failed")?;

    let algorithm = config.algorithm()?;
    let progress = LoggingProgress::new("reconstruction", 10);
    let volume = ReconstructionOrchestrator::new(algorithm)
        .with_crop_circle(config.crop_circle)
        .with_threads(config.threads)
        .run(prepared.view(), &angles, &progress, &CancellationToken::new())
        .context("reconstruction failed")?;

    let slices = SliceWriter::beside(&args.input);
    slices
        .write(&volume)
        .with_context(|| format!("failed to write slices to {}", slices.dir().display()))?;

    if !args.no_volume {
        let compression = match args.compression_level {
            Some(level) => VolumeCompression::BloscZstd(level),
            None => VolumeCompression::None,
        };
        let path = slices.dir().join("volume.zarr");
        let metadata = VolumeMetadata::new(&angles, &centre, algorithm, config.crop_circle);
        VolumeWriter::new(16, compression)
            .write(&path, &volume, &metadata)
            .with_context(|| format!("failed to write volume to {}", path.display()))?;
    }

    info!(
        output = %slices.dir().display(),
        slices = volume.slice_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Reconstruction complete"
    );
    Ok(())
}

/// Manual count if configured, interactive if requested or no estimate is
/// available, otherwise automatic detection.
fn calibrate_angles(
    stack: &ProjectionStack,
    config: &ReconConfig,
    interactive: bool,
) -> Result<AngleCalibration> {
    let calibrator = AngleCalibrator::new(stack, config.reference_index)?;

    let calibration = match (config.num_images, config.period_search()) {
        (Some(num_images), _) => calibrator.manual(num_images, config.ang_range)?,
        (None, Some(search)) if !interactive => calibrator
            .automatic(&search)
            .context("rotation period detection failed; set num_images or use --interactive")?,
        _ => calibrator.interactive(&mut TerminalOperator::stdio())?,
    };

    info!(
        num_images = calibration.num_images(),
        ang_range = calibration.range().degrees(),
        "Angles calibrated"
    );
    Ok(calibration)
}

fn calibrate_centre(
    stack: &ProjectionStack,
    angles: &AngleCalibration,
    config: &ReconConfig,
) -> Result<CenterCalibration> {
    let calibrator = CenterCalibrator::new(stack, angles);
    let calibration = match config.cor_offset {
        Some(offset) => calibrator.manual(offset)?,
        None => calibrator
            .automatic(&config.centre_search())
            .context("centre of rotation detection failed; set cor_offset")?,
    };

    info!(cor_offset = calibration.cor_offset(), "Centre calibrated");
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_config() {
        let args = Args::parse_from([
            "tomo-recon",
            "/data/frames",
            "--num-images",
            "401",
            "--cor-offset",
            "-3",
            "--recon-alg",
            "SART",
            "--crop-circle",
        ]);
        let config = args.load_config().unwrap();
        assert_eq!(config.num_images, Some(401));
        assert_eq!(config.cor_offset, Some(-3));
        assert_eq!(config.recon_alg, "sart");
        assert!(config.crop_circle);
    }

    #[test]
    fn test_crop_circle_off_by_default() {
        let args = Args::parse_from(["tomo-recon", "/data/frames"]);
        assert!(!args.load_config().unwrap().crop_circle);
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let args = Args::parse_from(["tomo-recon", "/data/frames", "--recon-alg", "art"]);
        assert!(args.load_config().is_err());
    }
}
