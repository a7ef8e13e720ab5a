//! Calibration and Reconstruction for Rotational CT Projection Stacks
//!
//! This crate turns a series of transmission images of a rotating specimen
//! into a stack of reconstructed slices. It provides:
//!
//! - **Angle calibration**: frames per revolution, detected from the
//!   frame-to-reference difference curve or supplied by an operator
//! - **Centre calibration**: rotation-axis offset from the mirrored 180° view
//! - **Preprocessing**: axis recentring, cropping, averaging and downsampling
//! - **Reconstruction**: backprojection, SART or visual hull, parallel over slices
//!
//! # Architecture
//!
//! ```text
//! FrameSource::load()
//!      │
//!      ▼
//! ProjectionStack
//!      │
//!      ├─► AngleCalibrator   ─► AngleCalibration  (p0, num_images, angles)
//!      │
//!      ├─► CenterCalibrator  ─► CenterCalibration (cor_offset)
//!      │
//!      └─► GeometryPreprocessor::prepare(crop, options)
//!               │
//!               ▼
//!          ReconstructionOrchestrator::run()
//!               │
//!               ├─► one sinogram per row ─► SliceReconstructor (rayon)
//!               │
//!               └─► optional circular crop
//!                        │
//!                        ▼
//!                   ReconVolume
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tomo_core::*;
//!
//! let stack = source.load()?;
//! let angles = AngleCalibrator::new(&stack, 5)?.automatic(&PeriodSearchConfig::new(400))?;
//! let centre = CenterCalibrator::new(&stack, &angles).automatic(&CentreSearchConfig::default())?;
//!
//! let prepared = GeometryPreprocessor::new(&stack, &angles, &centre)
//!     .prepare(&CropRegion::none(), &PreprocessOptions::default())?;
//!
//! let volume = ReconstructionOrchestrator::new(ReconAlgorithm::FilteredBackprojection)
//!     .with_crop_circle(true)
//!     .run(prepared.view(), &angles, &NoProgress, &CancellationToken::new())?;
//! ```

pub mod angles;
pub mod centre;
pub mod config;
pub mod error;
pub mod filters;
pub mod operator;
pub mod preprocess;
pub mod progress;
pub mod recon;
pub mod stack;

// Re-export commonly used types at crate root
pub use angles::{
    relative_minima, AngleCalibration, AngleCalibrator, AngularRange, PeriodSearch,
    PeriodSearchConfig,
};
pub use centre::{CenterCalibration, CenterCalibrator, CentreSearch, CentreSearchConfig};
pub use config::ReconConfig;
pub use error::{Result, TomoError};
pub use operator::{Operator, OperatorRequest, ScriptedOperator};
pub use preprocess::{CropRegion, GeometryPreprocessor, PreprocessOptions};
pub use progress::{AtomicProgress, CancellationToken, LoggingProgress, NoProgress, ProgressObserver};
pub use recon::{
    circle_square, Backprojection, ReconAlgorithm, ReconVolume, ReconstructionOrchestrator, Sart,
    SliceReconstructor, VisualHull,
};
pub use stack::{FrameSource, Histogram, InMemorySource, ProjectionStack};
