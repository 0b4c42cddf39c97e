//! In-process fake transcoding engine for tests.
//!
//! The fake understands just enough of the FFmpeg command line to answer
//! probe runs with a stream summary, emit progress blocks for transcodes and
//! write a deterministic output file. It counts live workers so tests can
//! assert that every worker was released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;
use crate::worker::{ExitStatus, TranscodeEngine, TranscodeWorker, WorkerEvent, WorkerEventHandler};

/// Scripted behavior of a [`FakeEngine`].
#[derive(Debug, Clone)]
pub struct FakeScript {
    pub source_duration: f64,
    pub width: u32,
    pub height: u32,
    pub has_video: bool,
    pub has_audio: bool,
    /// Pause between progress blocks
    pub block_delay: Duration,
    /// Every progress block is sent twice, as FFmpeg does while it buffers
    pub stalled_blocks: bool,
    /// Transcodes in workers with this label wait for cancellation
    pub hang_stage: Option<String>,
    /// Transcodes (in workers with the given label, or all) exit with this code
    pub fail: Option<(Option<String>, i32)>,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            source_duration: 10.0,
            width: 1920,
            height: 1080,
            has_video: true,
            has_audio: true,
            block_delay: Duration::from_millis(1),
            stalled_blocks: false,
            hang_stage: None,
            fail: None,
        }
    }
}

impl FakeScript {
    pub fn with_source_duration(mut self, secs: f64) -> Self {
        self.source_duration = secs;
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    pub fn audio_only(mut self) -> Self {
        self.has_video = false;
        self
    }

    pub fn with_block_delay(mut self, delay: Duration) -> Self {
        self.block_delay = delay;
        self
    }

    pub fn with_stalled_blocks(mut self) -> Self {
        self.stalled_blocks = true;
        self
    }

    /// Every transcode hangs until cancelled.
    pub fn hang_on_transcode(self) -> Self {
        self.hang_in_stage("*")
    }

    /// Transcodes in workers spawned with `label` hang until cancelled.
    pub fn hang_in_stage(mut self, label: &str) -> Self {
        self.hang_stage = Some(label.to_string());
        self
    }

    /// Every transcode exits with `code`.
    pub fn fail_transcode(mut self, code: i32) -> Self {
        self.fail = Some((None, code));
        self
    }

    /// Transcodes in workers spawned with `label` exit with `code`.
    pub fn fail_in_stage(mut self, label: &str, code: i32) -> Self {
        self.fail = Some((Some(label.to_string()), code));
        self
    }

    fn probe_log(&self) -> Vec<String> {
        let mut lines = vec!["Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'input.mp4':".to_string()];
        let total = self.source_duration;
        let hours = (total / 3600.0).floor();
        let minutes = ((total - hours * 3600.0) / 60.0).floor();
        let seconds = total - hours * 3600.0 - minutes * 60.0;
        lines.push(format!(
            "  Duration: {:02}:{:02}:{:05.2}, start: 0.000000, bitrate: 1000 kb/s",
            hours as u32, minutes as u32, seconds
        ));
        if self.has_video {
            lines.push(format!(
                "  Stream #0:0(und): Video: h264 (High), yuv420p(progressive), {}x{} [SAR 1:1 DAR 16:9], 30 fps, 30 tbr",
                self.width, self.height
            ));
        }
        if self.has_audio {
            lines.push("  Stream #0:1(und): Audio: aac (LC), 48000 Hz, stereo, fltp, 128 kb/s".to_string());
        }
        lines.push("At least one output file must be specified".to_string());
        lines
    }
}

/// Counters shared by a fake engine and its workers.
#[derive(Debug, Default)]
pub struct FakeStats {
    spawned: AtomicUsize,
    live: AtomicUsize,
    commands: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeStats {
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Workers not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Executed commands as `(worker label, args)`.
    pub fn commands(&self) -> Vec<(String, Vec<String>)> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Fake engine running entirely in memory.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    script: Arc<FakeScript>,
    stats: Arc<FakeStats>,
}

impl FakeEngine {
    pub fn new(script: FakeScript) -> Self {
        Self {
            script: Arc::new(script),
            stats: Arc::new(FakeStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn spawn(&self, label: &str) -> MediaResult<Box<dyn TranscodeWorker>> {
        let n = self.stats.spawned.fetch_add(1, Ordering::SeqCst);
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWorker {
            id: format!("{label}-{n}"),
            label: label.to_string(),
            script: self.script.clone(),
            stats: self.stats.clone(),
            files: HashMap::new(),
            handler: None,
            terminated: false,
        }))
    }
}

struct FakeWorker {
    id: String,
    label: String,
    script: Arc<FakeScript>,
    stats: Arc<FakeStats>,
    files: HashMap<String, Vec<u8>>,
    handler: Option<WorkerEventHandler>,
    terminated: bool,
}

impl FakeWorker {
    fn emit(&self, event: WorkerEvent) {
        if let Some(handler) = &self.handler {
            handler(event);
        }
    }

    fn ensure_alive(&self) -> MediaResult<()> {
        if self.terminated {
            return Err(MediaError::WorkerTerminated(self.id.clone()));
        }
        Ok(())
    }

    fn stage_matches(&self, stage: &Option<String>) -> bool {
        match stage.as_deref() {
            None | Some("*") => true,
            Some(label) => label == self.label,
        }
    }

    /// Expected output length: the first `-t` value, else the source duration.
    fn expected_secs(&self, args: &[String]) -> f64 {
        args.iter()
            .position(|a| a == "-t")
            .and_then(|i| args.get(i + 1))
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.script.source_duration)
    }
}

impl Drop for FakeWorker {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscodeWorker for FakeWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_input(&mut self, name: &str, bytes: &[u8]) -> MediaResult<()> {
        self.ensure_alive()?;
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_output(&mut self, name: &str) -> MediaResult<Vec<u8>> {
        self.ensure_alive()?;
        self.files.get(name).cloned().ok_or_else(|| {
            MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{name} not found in worker {}", self.id),
            ))
        })
    }

    async fn delete_file(&mut self, name: &str) -> MediaResult<()> {
        self.ensure_alive()?;
        self.files.remove(name);
        Ok(())
    }

    fn set_event_handler(&mut self, handler: Option<WorkerEventHandler>) {
        self.handler = handler;
    }

    async fn execute(&mut self, args: &[String], cancel: &CancelSignal) -> MediaResult<ExitStatus> {
        self.ensure_alive()?;
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        if let Ok(mut commands) = self.stats.commands.lock() {
            commands.push((self.label.clone(), args.to_vec()));
        }

        // Probe-only run
        if args.first().map(String::as_str) == Some("-hide_banner") {
            let log = self.script.probe_log();
            for line in &log {
                self.emit(WorkerEvent::Log(line.clone()));
            }
            tokio::task::yield_now().await;
            return Ok(ExitStatus {
                code: Some(1),
                log_tail: log,
            });
        }

        if self.stage_matches(&self.script.hang_stage) && self.script.hang_stage.is_some() {
            let mut cancel = cancel.clone();
            cancel.cancelled().await;
            return Err(MediaError::Cancelled);
        }

        if let Some((stage, code)) = &self.script.fail {
            if self.stage_matches(stage) {
                let line = format!("{}: simulated failure", self.label);
                self.emit(WorkerEvent::Log(line.clone()));
                return Ok(ExitStatus {
                    code: Some(*code),
                    log_tail: vec![line],
                });
            }
        }

        for input in args.windows(2).filter(|w| w[0] == "-i").map(|w| &w[1]) {
            let is_pattern = input.contains('%');
            let is_lavfi = input.starts_with("anullsrc");
            if !is_pattern && !is_lavfi && !self.files.contains_key(input) {
                let line = format!("{input}: No such file or directory");
                return Ok(ExitStatus {
                    code: Some(1),
                    log_tail: vec![line],
                });
            }
        }

        let expected = self.expected_secs(args);
        let mut progress = FfmpegProgress::default();
        for step in 1..=4u32 {
            let mut cancel_wait = cancel.clone();
            tokio::select! {
                biased;
                _ = cancel_wait.cancelled() => return Err(MediaError::Cancelled),
                _ = tokio::time::sleep(self.script.block_delay) => {}
            }
            progress.frame = (expected * 30.0 * step as f64 / 4.0) as u64;
            progress.out_time_us = (expected * 1_000_000.0 * step as f64 / 4.0) as i64;
            progress.speed = 4.0;
            progress.is_complete = step == 4;
            if self.script.stalled_blocks {
                self.emit(WorkerEvent::Progress(progress.clone()));
            }
            self.emit(WorkerEvent::Progress(progress.clone()));
        }

        let output = args
            .last()
            .cloned()
            .ok_or_else(|| MediaError::internal("fake engine got no output"))?;
        let inputs = args.iter().filter(|a| *a == "-i").count();
        let body = format!("fake:{output}:{inputs}:{expected:.3}");
        self.files.insert(output, body.into_bytes());

        Ok(ExitStatus {
            code: Some(0),
            log_tail: Vec::new(),
        })
    }

    async fn terminate(&mut self) -> MediaResult<()> {
        self.terminated = true;
        self.files.clear();
        self.handler = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_probe::SourceProbe;

    #[test]
    fn test_probe_log_parses() {
        let script = FakeScript::default().with_source_duration(75.5).without_audio();
        let probe = SourceProbe::from_log(script.probe_log());
        assert_eq!(probe.duration, Some(75.5));
        assert!(probe.has_video);
        assert!(!probe.has_audio);
    }

    #[tokio::test]
    async fn test_live_worker_accounting() {
        let engine = FakeEngine::new(FakeScript::default());
        let stats = engine.stats();
        let a = engine.spawn("normalize").await.unwrap();
        let b = engine.spawn("normalize").await.unwrap();
        assert_eq!(stats.live(), 2);
        drop(a);
        drop(b);
        assert_eq!(stats.live(), 0);
        assert_eq!(stats.spawned(), 2);
    }
}
