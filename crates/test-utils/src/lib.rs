//! Shared test utilities for the tomography workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Analytic projection generators (rotating disk phantoms, sinograms)
//! - Canonical phantoms used by the integration suites
//! - Approximate-equality assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, RotatingPhantom};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use generators::*;

/// Assert two numbers agree within `epsilon`, optionally with a context
/// message.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(cal.angles()[1], 5.0, 1e-9);
/// assert_approx_eq!(pixel, 0.5, 1e-4, "frame {}", index);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {
        $crate::assert_approx_eq!($left, $right, $epsilon, "values differ")
    };
    ($left:expr, $right:expr, $epsilon:expr, $($context:tt)+) => {{
        let left = $left as f64;
        let right = $right as f64;
        let epsilon = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "approx assertion failed ({}): left {}, right {}, diff {} > {}",
                format!($($context)+),
                left,
                right,
                diff,
                epsilon
            );
        }
    }};
}
