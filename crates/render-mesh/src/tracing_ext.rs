//! Tracing helpers for render mesh processing.
//!
//! Events use a small set of targets so a subscriber can pick them apart:
//!
//! - `render_mesh::timing`: start and end of each operation
//! - `render_mesh::mesh_state`: point and facet counts between stages
//! - `render_mesh::progress`: stage progress
//! - `render_mesh::io`: file reads and writes
//! - `render_mesh::perf`: hot sections, at trace level
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=render_mesh=debug for kernel and execution-mode decisions
//! ```

use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{debug, info, trace, warn};

use crate::components::ComponentAnalysis;
use crate::types::MeshSnapshot;

/// Logs the duration of an operation when dropped.
///
/// The operation's span stays entered for the timer's lifetime, so events
/// logged inside carry its fields.
///
/// ```rust,ignore
/// use render_mesh::tracing_ext::OperationTimer;
///
/// fn project() {
///     let _timer = OperationTimer::new("uv_projection");
///     // ...
/// }
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    _span: EnteredSpan,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("render_operation", operation = name);
        debug!(target: "render_mesh::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            _span: span.entered(),
        }
    }

    /// Timer whose span also records mesh size.
    pub fn with_context(name: &'static str, facet_count: usize, point_count: usize) -> Self {
        let span = tracing::info_span!(
            "render_operation",
            operation = name,
            facets = facet_count,
            points = point_count
        );
        debug!(
            target: "render_mesh::timing",
            operation = name,
            facets = facet_count,
            points = point_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            _span: span.entered(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "render_mesh::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log snapshot size and extent at debug level.
pub fn log_mesh_stats(snapshot: &MeshSnapshot, context: &str) {
    let (min_bounds, max_bounds) = snapshot.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "render_mesh::mesh_state",
        context = context,
        points = snapshot.point_count(),
        facets = snapshot.facet_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log the outcome of component labelling.
pub fn log_component_result(analysis: &ComponentAnalysis, split_angle_deg: f64) {
    info!(
        target: "render_mesh::mesh_state",
        components = analysis.component_count,
        largest = analysis.largest_component_size,
        smallest = analysis.smallest_component_size,
        split_angle_deg = format!("{:.1}", split_angle_deg),
        "Smooth components labelled"
    );
}

/// Log progress of a multi-stage operation.
pub fn log_progress(operation: &str, current: u64, total: u64, stage: Option<&str>) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };

    debug!(
        target: "render_mesh::progress",
        operation = operation,
        current = current,
        total = total,
        percent = percent,
        stage = stage.unwrap_or("processing"),
        "Progress update"
    );
}

/// Log a file read or write.
pub fn log_io_operation(operation: &str, path: &std::path::Path, format: Option<&str>, success: bool) {
    if success {
        info!(
            target: "render_mesh::io",
            operation = operation,
            path = path.display().to_string(),
            format = format.unwrap_or("auto"),
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "render_mesh::io",
            operation = operation,
            path = path.display().to_string(),
            format = format.unwrap_or("auto"),
            "I/O operation failed"
        );
    }
}

/// Guard that logs the elapsed time of a hot section at trace level.
#[must_use]
pub fn log_perf_section(name: &'static str) -> impl Drop {
    struct PerfGuard {
        name: &'static str,
        start: Instant,
    }
    impl Drop for PerfGuard {
        fn drop(&mut self) {
            trace!(
                target: "render_mesh::perf",
                section = self.name,
                elapsed_us = self.start.elapsed().as_micros(),
                "Performance section completed"
            );
        }
    }
    PerfGuard {
        name,
        start: Instant::now(),
    }
}
