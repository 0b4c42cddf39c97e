//! Render job metrics.
//!
//! Recorded through the `metrics` facade; the CLI installs no exporter.

use metrics::{counter, gauge, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Finished renders by outcome.
    pub const RENDERS_TOTAL: &str = "vfx_renders_total";

    /// Render wall time in seconds by outcome.
    pub const RENDER_SECONDS: &str = "vfx_render_seconds";

    /// Time spent in each stage.
    pub const STAGE_SECONDS: &str = "vfx_render_stage_seconds";

    /// Workers currently leased by render jobs.
    pub const LIVE_WORKERS: &str = "vfx_live_workers";
}

/// Record a finished render.
pub fn record_render(outcome: &str, seconds: f64) {
    counter!(
        names::RENDERS_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::RENDER_SECONDS,
        "outcome" => outcome.to_string()
    )
    .record(seconds);
}

/// Record the time a job spent in `stage`.
pub fn record_stage(stage: &str, seconds: f64) {
    histogram!(
        names::STAGE_SECONDS,
        "stage" => stage.to_string()
    )
    .record(seconds);
}

pub fn worker_leased() {
    gauge!(names::LIVE_WORKERS).increment(1.0);
}

pub fn worker_released() {
    gauge!(names::LIVE_WORKERS).decrement(1.0);
}
