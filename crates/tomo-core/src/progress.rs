//! Progress reporting and cancellation for slice reconstruction.
//!
//! Both are safe to share between rayon workers: progress is a pair of
//! atomic counters and cancellation is a single atomic flag. Neither
//! imposes any ordering on slice completion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

/// Observer notified after each unit of work completes.
pub trait ProgressObserver: Send + Sync {
    /// Called once before the first unit starts.
    fn start(&self, _total: usize) {}

    /// Called after one unit of work finished. `completed` counts every
    /// unit finished so far, in whatever order they finished.
    fn advance(&self, completed: usize, total: usize);
}

/// Observer that ignores all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn advance(&self, _completed: usize, _total: usize) {}
}

/// Observer that stores the latest counts so another thread can poll them.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed fraction in `[0, 1]`; zero before the run starts.
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.completed() as f64 / total as f64
        }
    }
}

impl ProgressObserver for AtomicProgress {
    fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
    }

    fn advance(&self, completed: usize, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.fetch_max(completed, Ordering::Relaxed);
    }
}

/// Observer that logs every `step` percent through `tracing`.
#[derive(Debug)]
pub struct LoggingProgress {
    label: &'static str,
    step_percent: usize,
    last_logged: AtomicUsize,
}

impl LoggingProgress {
    pub fn new(label: &'static str, step_percent: usize) -> Self {
        Self {
            label,
            step_percent: step_percent.clamp(1, 100),
            last_logged: AtomicUsize::new(0),
        }
    }
}

impl ProgressObserver for LoggingProgress {
    fn start(&self, total: usize) {
        self.last_logged.store(0, Ordering::Relaxed);
        info!(stage = self.label, total, "Started");
    }

    fn advance(&self, completed: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = completed * 100 / total;
        let bucket = percent / self.step_percent;
        let previous = self.last_logged.fetch_max(bucket, Ordering::Relaxed);
        if bucket > previous || completed == total {
            info!(stage = self.label, completed, total, percent, "Progress");
        }
    }
}

/// Cooperative cancellation flag, checked between slices.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
