//! Stage progress reporting.
//!
//! Processing runs as a fixed sequence of stages (UV projection, adjacency,
//! components, splitting, normals). A [`StageTracker`] counts them off and
//! forwards a [`Progress`] snapshot to an optional callback.
//!
//! ```ignore
//! use std::sync::Arc;
//! use render_mesh::progress::ProgressCallback;
//!
//! let callback: ProgressCallback = Arc::new(|progress| {
//!     eprintln!("{:>3}% {}", progress.percent(), progress.message);
//! });
//! let mesh = RenderMesh::with_progress(source, transformation, &params, callback)?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::tracing_ext::log_progress;

/// Snapshot passed to progress callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Stages completed so far.
    pub current: u64,

    /// Total number of stages.
    pub total: u64,

    /// Name of the stage just completed.
    pub message: String,

    /// Time since the operation started.
    pub elapsed: Duration,
}

impl Progress {
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Progress as a fraction in `[0, 1]`.
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Called once per completed stage. Processing cannot be cancelled.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Counts completed stages of one operation.
pub struct StageTracker {
    operation: &'static str,
    current: AtomicU64,
    total: u64,
    start_time: Instant,
    callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for StageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageTracker")
            .field("operation", &self.operation)
            .field("current", &self.current())
            .field("total", &self.total)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl StageTracker {
    pub fn new(operation: &'static str, total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            operation,
            current: AtomicU64::new(0),
            total,
            start_time: Instant::now(),
            callback,
        }
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Mark one stage done and notify the callback.
    pub fn advance(&self, stage: &str) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        log_progress(self.operation, current, self.total, Some(stage));

        if let Some(callback) = &self.callback {
            let progress = Progress {
                current,
                total: self.total,
                message: stage.to_string(),
                elapsed: self.elapsed(),
            };
            callback(&progress);
        }
    }
}
