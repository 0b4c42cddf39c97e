//! Transcoding engine capability.
//!
//! A worker is one isolated transcoder instance with a private scratch
//! filesystem. Inputs are written in, a command is executed, outputs are read
//! back. Dropping a worker releases its process and scratch.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Number of log lines kept for failure reports.
pub const LOG_TAIL_LINES: usize = 20;

/// Event emitted by a worker while a command runs.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// One line of engine log output
    Log(String),
    /// A completed progress block
    Progress(FfmpegProgress),
}

/// Receives worker events. Called from the worker's reader task.
pub type WorkerEventHandler = Arc<dyn Fn(WorkerEvent) + Send + Sync>;

/// Outcome of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Process exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Last log lines, oldest first
    pub log_tail: Vec<String>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into a worker failure for `stage`.
    pub fn check(self, stage: &str) -> MediaResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(MediaError::worker_failed(
                stage,
                self.code,
                self.log_tail.join("\n"),
            ))
        }
    }
}

/// Factory for isolated transcoding workers.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Spawn a fresh worker with empty scratch.
    async fn spawn(&self, label: &str) -> MediaResult<Box<dyn TranscodeWorker>>;
}

/// One isolated transcoder instance.
#[async_trait]
pub trait TranscodeWorker: Send {
    /// Unique worker id.
    fn id(&self) -> &str;

    /// Write a file into the worker's scratch.
    async fn write_input(&mut self, name: &str, bytes: &[u8]) -> MediaResult<()>;

    /// Read a file back from the worker's scratch.
    async fn read_output(&mut self, name: &str) -> MediaResult<Vec<u8>>;

    /// Remove a file from the worker's scratch. Missing files are ignored.
    async fn delete_file(&mut self, name: &str) -> MediaResult<()>;

    /// Install (or clear) the handler receiving log and progress events.
    fn set_event_handler(&mut self, handler: Option<WorkerEventHandler>);

    /// Run one command to completion.
    ///
    /// Returns `Err(MediaError::Cancelled)` when `cancel` fires first; the
    /// running process is killed before returning. A non-zero exit is not an
    /// error here, see [`ExitStatus::check`].
    async fn execute(&mut self, args: &[String], cancel: &CancelSignal) -> MediaResult<ExitStatus>;

    /// Stop the worker and release its scratch. Idempotent.
    async fn terminate(&mut self) -> MediaResult<()>;
}

impl fmt::Debug for dyn TranscodeWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeWorker").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_check() {
        let ok = ExitStatus {
            code: Some(0),
            log_tail: vec![],
        };
        assert!(ok.check("normalize").is_ok());

        let failed = ExitStatus {
            code: Some(1),
            log_tail: vec!["Invalid data found".to_string()],
        };
        match failed.check("normalize") {
            Err(MediaError::WorkerFailed {
                stage,
                exit_code,
                message,
            }) => {
                assert_eq!(stage, "normalize");
                assert_eq!(exit_code, Some(1));
                assert!(message.contains("Invalid data"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
