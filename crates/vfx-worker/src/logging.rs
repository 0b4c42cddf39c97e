//! Render job logging.
//!
//! Every line a job emits carries its id and operation. The job span also
//! records the current stage, so worker and media logs emitted inside it are
//! attributed to the stage that produced them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, field, info, warn, Span};
use vfx_models::{JobId, RenderStage, TransitionWindow};

use crate::error::RenderError;

/// Lifecycle logger of one render job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
    started_at: DateTime<Utc>,
    span: Span,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        let started_at = Utc::now();
        let span = tracing::info_span!(
            "render_job",
            job_id = %job_id,
            operation,
            stage = field::Empty,
        );
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
            started_at,
            span,
        }
    }

    /// Wall-clock time since the job was created.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Span every future of the job runs in.
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    /// Shape of the accepted request.
    pub fn log_request(&self, segments: usize, transitions: usize, width: u32, height: u32) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            started_at = %self.started_at.to_rfc3339(),
            segments,
            transitions,
            width,
            height,
            "Render started"
        );
    }

    /// Stage change, with the time spent in the stage that ended.
    pub fn log_stage(&self, from: RenderStage, to: RenderStage, spent: Duration) {
        self.span.record("stage", to.as_str());
        info!(
            job_id = %self.job_id,
            from = %from,
            to = %to,
            spent_ms = spent.as_millis() as u64,
            "Render stage changed"
        );
    }

    /// Two transition windows share screen time.
    pub fn log_overlap(&self, first: &TransitionWindow, second: &TransitionWindow) {
        warn!(
            job_id = %self.job_id,
            first = first.index,
            second = second.index,
            first_end = first.end,
            second_start = second.start,
            "Transition windows overlap; the later one draws on top"
        );
    }

    pub fn log_worker_leased(&self, worker_id: &str, label: &str) {
        debug!(job_id = %self.job_id, worker_id, label, "Worker leased");
    }

    /// A lease ended without an explicit release.
    pub fn log_worker_dropped(&self, worker_id: &str) {
        debug!(job_id = %self.job_id, worker_id, "Worker dropped without release");
    }

    pub fn log_done(&self, bytes: usize) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            bytes,
            elapsed_secs = self.elapsed().as_secs_f64(),
            "Render finished"
        );
    }

    pub fn log_cancelled(&self) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            elapsed_secs = self.elapsed().as_secs_f64(),
            "Render cancelled"
        );
    }

    pub fn log_failed(&self, err: &RenderError) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            kind = err.kind(),
            elapsed_secs = self.elapsed().as_secs_f64(),
            "Render failed: {}", err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_counts_from_creation() {
        let logger = JobLogger::new(&JobId::new(), "render");
        std::thread::sleep(Duration::from_millis(5));
        assert!(logger.elapsed() >= Duration::from_millis(5));
    }
}
