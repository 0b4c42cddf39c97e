//! FFmpeg process engine.
//!
//! Each worker owns a private temporary directory used as FFmpeg's working
//! directory. Commands run as child processes with `-progress pipe:2`; stderr
//! is split into progress blocks and log lines and forwarded as events.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::progress::{ProgressLine, ProgressParser};
use crate::worker::{
    ExitStatus, TranscodeEngine, TranscodeWorker, WorkerEvent, WorkerEventHandler, LOG_TAIL_LINES,
};

/// Engine spawning FFmpeg child processes.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    /// FFmpeg executable
    binary: PathBuf,
    /// Parent directory for worker scratch, system temp dir when `None`
    scratch_root: Option<PathBuf>,
}

impl FfmpegEngine {
    /// Locate `ffmpeg` on `PATH`.
    pub fn from_path() -> MediaResult<Self> {
        let binary = check_ffmpeg()?;
        Ok(Self::with_binary(binary))
    }

    /// Use an explicit FFmpeg executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch_root: None,
        }
    }

    /// Create worker scratch directories under `root`.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn spawn(&self, label: &str) -> MediaResult<Box<dyn TranscodeWorker>> {
        let id = format!("{label}-{}", &Uuid::new_v4().simple().to_string()[..8]);

        let mut builder = tempfile::Builder::new();
        builder.prefix("vfx-worker-");
        let scratch = match &self.scratch_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!(worker_id = %id, scratch = %scratch.path().display(), "Spawned FFmpeg worker");
        metrics::record_worker_spawned(self.name());

        Ok(Box::new(FfmpegWorker {
            id,
            stage: label.to_string(),
            binary: self.binary.clone(),
            scratch: Some(scratch),
            handler: None,
        }))
    }
}

/// One FFmpeg worker with its scratch directory.
pub struct FfmpegWorker {
    id: String,
    stage: String,
    binary: PathBuf,
    /// `None` once terminated
    scratch: Option<TempDir>,
    handler: Option<WorkerEventHandler>,
}

impl FfmpegWorker {
    fn scratch_dir(&self) -> MediaResult<&Path> {
        self.scratch
            .as_ref()
            .map(|dir| dir.path())
            .ok_or_else(|| MediaError::WorkerTerminated(self.id.clone()))
    }

    /// Resolve a scratch-relative file name, rejecting anything that escapes it.
    fn scratch_path(&self, name: &str) -> MediaResult<PathBuf> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || name.is_empty() {
            return Err(MediaError::validation(format!(
                "scratch file name '{name}' must be a plain relative path"
            )));
        }
        Ok(self.scratch_dir()?.join(relative))
    }
}

#[async_trait]
impl TranscodeWorker for FfmpegWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_input(&mut self, name: &str, bytes: &[u8]) -> MediaResult<()> {
        let path = self.scratch_path(name)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn read_output(&mut self, name: &str) -> MediaResult<Vec<u8>> {
        let path = self.scratch_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn delete_file(&mut self, name: &str) -> MediaResult<()> {
        let path = self.scratch_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn set_event_handler(&mut self, handler: Option<WorkerEventHandler>) {
        self.handler = handler;
    }

    async fn execute(&mut self, args: &[String], cancel: &CancelSignal) -> MediaResult<ExitStatus> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let dir = self.scratch_dir()?.to_path_buf();
        debug!(worker_id = %self.id, "Running FFmpeg: ffmpeg {}", args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let handler = self.handler.clone();

        // Reader task: forwards events and keeps the log tail
        let mut reader = StderrReader(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::new();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(LOG_TAIL_LINES);

            while let Ok(Some(line)) = lines.next_line().await {
                match parser.parse_line(&line) {
                    ProgressLine::Block(progress) => {
                        if let Some(handler) = &handler {
                            handler(WorkerEvent::Progress(progress));
                        }
                    }
                    ProgressLine::Field => {}
                    ProgressLine::Log => {
                        if tail.len() == LOG_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                        if let Some(handler) = &handler {
                            handler(WorkerEvent::Log(line));
                        }
                    }
                }
            }

            Vec::from(tail)
        }));

        let mut cancel = cancel.clone();
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        let Some(status) = waited else {
            info!(worker_id = %self.id, "FFmpeg cancelled, killing process");
            if let Err(e) = child.kill().await {
                warn!(worker_id = %self.id, error = %e, "Failed to kill FFmpeg process");
            }
            drop(reader);
            metrics::record_command(&self.stage, "cancelled", started.elapsed().as_secs_f64());
            return Err(MediaError::Cancelled);
        };

        let status = status?;
        let log_tail = (&mut reader.0).await.unwrap_or_default();
        let exit = ExitStatus {
            code: status.code(),
            log_tail,
        };

        let outcome = if exit.success() { "success" } else { "failure" };
        metrics::record_command(&self.stage, outcome, started.elapsed().as_secs_f64());
        debug!(
            worker_id = %self.id,
            exit_code = ?exit.code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "FFmpeg exited"
        );

        Ok(exit)
    }

    async fn terminate(&mut self) -> MediaResult<()> {
        if let Some(scratch) = self.scratch.take() {
            debug!(worker_id = %self.id, "Terminating FFmpeg worker");
            scratch.close()?;
        }
        self.handler = None;
        Ok(())
    }
}

/// Stderr reader of one `execute` call, aborted when the call ends or is
/// dropped so no event reaches the handler afterwards.
struct StderrReader(JoinHandle<Vec<String>>);

impl Drop for StderrReader {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(root: &Path) -> FfmpegEngine {
        FfmpegEngine::with_binary("ffmpeg").with_scratch_root(root)
    }

    #[tokio::test]
    async fn test_scratch_file_roundtrip_and_release() {
        let root = tempfile::tempdir().unwrap();
        let mut worker = engine(root.path()).spawn("normalize").await.unwrap();
        assert!(worker.id().starts_with("normalize-"));

        worker.write_input("input.mp4", b"data").await.unwrap();
        assert_eq!(worker.read_output("input.mp4").await.unwrap(), b"data");

        worker.delete_file("input.mp4").await.unwrap();
        worker.delete_file("input.mp4").await.unwrap();
        assert!(worker.read_output("input.mp4").await.is_err());

        worker.terminate().await.unwrap();
        worker.terminate().await.unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(matches!(
            worker.write_input("x", b"").await,
            Err(MediaError::WorkerTerminated(_))
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_scratch() {
        let root = tempfile::tempdir().unwrap();
        {
            let mut worker = engine(root.path()).spawn("concat").await.unwrap();
            worker.write_input("list.txt", b"file 'a'").await.unwrap();
            assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
        }
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let root = tempfile::tempdir().unwrap();
        let mut worker = engine(root.path()).spawn("normalize").await.unwrap();
        assert!(worker.write_input("../evil", b"").await.is_err());
        assert!(worker.write_input("/etc/passwd", b"").await.is_err());
        assert!(worker.write_input("", b"").await.is_err());
    }

    #[tokio::test]
    async fn test_execute_after_cancel_never_spawns() {
        let root = tempfile::tempdir().unwrap();
        let mut worker = FfmpegEngine::with_binary("/nonexistent/ffmpeg")
            .with_scratch_root(root.path())
            .spawn("normalize")
            .await
            .unwrap();

        let handle = crate::cancel::CancelHandle::new();
        handle.cancel();
        let result = worker.execute(&["-version".to_string()], &handle.signal()).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_execute_stops_events() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let root = tempfile::tempdir().unwrap();
        let mut worker = FfmpegEngine::with_binary("/bin/sh")
            .with_scratch_root(root.path())
            .spawn("normalize")
            .await
            .unwrap();

        let blocks = Arc::new(AtomicUsize::new(0));
        {
            let blocks = blocks.clone();
            worker.set_event_handler(Some(Arc::new(move |event: WorkerEvent| {
                if matches!(event, WorkerEvent::Progress(_)) {
                    blocks.fetch_add(1, Ordering::SeqCst);
                }
            })));
        }

        // An endless stream of progress blocks on stderr
        let args = vec![
            "-c".to_string(),
            "while true; do echo out_time_us=1000000 >&2; echo progress=continue >&2; sleep 0.01; done".to_string(),
        ];
        let never = CancelSignal::never();
        let run = worker.execute(&args, &never);
        assert!(tokio::time::timeout(Duration::from_millis(300), run).await.is_err());

        let seen = blocks.load(Ordering::SeqCst);
        assert!(seen > 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(blocks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_missing_binary_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut worker = FfmpegEngine::with_binary("/nonexistent/ffmpeg")
            .with_scratch_root(root.path())
            .spawn("normalize")
            .await
            .unwrap();

        let result = worker.execute(&["-version".to_string()], &CancelSignal::never()).await;
        assert!(matches!(result, Err(MediaError::FfmpegNotFound)));
    }
}
