//! Transcode worker metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the host
//! installs a recorder.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Workers spawned by engine.
    pub const WORKERS_SPAWNED_TOTAL: &str = "vfx_workers_spawned_total";

    /// Executed commands by stage and outcome.
    pub const COMMANDS_TOTAL: &str = "vfx_worker_commands_total";

    /// Command wall time in seconds by stage.
    pub const COMMAND_SECONDS: &str = "vfx_worker_command_seconds";

    /// Rasterized overlay frames.
    pub const FRAMES_RASTERIZED_TOTAL: &str = "vfx_frames_rasterized_total";
}

/// Record a spawned worker.
pub fn record_worker_spawned(engine: &str) {
    counter!(
        names::WORKERS_SPAWNED_TOTAL,
        "engine" => engine.to_string()
    )
    .increment(1);
}

/// Record a finished command.
pub fn record_command(stage: &str, outcome: &str, seconds: f64) {
    counter!(
        names::COMMANDS_TOTAL,
        "stage" => stage.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::COMMAND_SECONDS,
        "stage" => stage.to_string()
    )
    .record(seconds);
}

/// Record rasterized frames.
pub fn record_frames_rasterized(count: u64) {
    counter!(names::FRAMES_RASTERIZED_TOTAL).increment(count);
}
