//! Render job bookkeeping.
//!
//! A [`RenderJob`] exists once per render invocation. It tracks the current
//! stage, the workers leased from the transcoding engine and the last
//! reported progress. Workers are only ever held through a [`WorkerLease`],
//! which unregisters itself on drop, so the live set drains on success,
//! failure and cancellation alike.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::debug;
use vfx_media::{CancelSignal, TranscodeEngine, TranscodeWorker};
use vfx_models::{JobId, RenderStage};

use crate::error::RenderResult;
use crate::logging::JobLogger;
use crate::metrics;

/// Receives the aggregate progress percent, never decreasing.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug)]
struct StageState {
    stage: RenderStage,
    entered: Instant,
}

/// State of one render invocation.
#[derive(Debug)]
pub struct RenderJob {
    id: JobId,
    logger: JobLogger,
    cancel: CancelSignal,
    stage: Mutex<StageState>,
    live_workers: Mutex<HashSet<String>>,
    progress: Mutex<f64>,
}

impl RenderJob {
    pub fn new(operation: &str, cancel: CancelSignal) -> Self {
        let id = JobId::new();
        Self {
            logger: JobLogger::new(&id, operation),
            id,
            cancel,
            stage: Mutex::new(StageState {
                stage: RenderStage::Idle,
                entered: Instant::now(),
            }),
            live_workers: Mutex::new(HashSet::new()),
            progress: Mutex::new(0.0),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    /// A fresh observer of the job's cancellation signal.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
            .lock()
            .map(|s| s.stage)
            .unwrap_or(RenderStage::Failed)
    }

    /// Move to `next` if the stage machine allows it.
    ///
    /// Returns `false` and leaves the stage untouched otherwise.
    pub fn set_stage(&self, next: RenderStage) -> bool {
        let Ok(mut state) = self.stage.lock() else {
            return false;
        };
        let current = state.stage;
        if !current.can_transition_to(next) {
            debug!(job_id = %self.id, from = %current, to = %next, "Ignoring stage change");
            return false;
        }

        let spent = state.entered.elapsed();
        metrics::record_stage(current.as_str(), spent.as_secs_f64());
        state.stage = next;
        state.entered = Instant::now();
        drop(state);

        self.logger.log_stage(current, next, spent);
        true
    }

    /// Last reported progress percent.
    pub fn progress(&self) -> f64 {
        self.progress.lock().map(|p| *p).unwrap_or(0.0)
    }

    pub(crate) fn record_progress(&self, percent: f64) {
        if let Ok(mut progress) = self.progress.lock() {
            *progress = progress.max(percent);
        }
    }

    /// Number of workers currently leased.
    pub fn live_workers(&self) -> usize {
        self.live_workers.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Ids of the workers currently leased.
    pub fn live_worker_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .live_workers
            .lock()
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn register(&self, worker_id: &str) {
        if let Ok(mut live) = self.live_workers.lock() {
            live.insert(worker_id.to_string());
        }
        metrics::worker_leased();
    }

    fn unregister(&self, worker_id: &str) {
        if let Ok(mut live) = self.live_workers.lock() {
            live.remove(worker_id);
        }
        metrics::worker_released();
    }
}

/// A worker registered with a job for as long as the lease lives.
///
/// Dropping the lease drops the worker, which kills any running process and
/// removes its scratch. [`WorkerLease::release`] terminates it explicitly
/// first.
pub struct WorkerLease {
    job: Arc<RenderJob>,
    worker: Box<dyn TranscodeWorker>,
    id: String,
    released: bool,
}

impl WorkerLease {
    /// Spawn a worker for `job` and register it.
    pub async fn acquire(job: &Arc<RenderJob>, engine: &dyn TranscodeEngine, label: &str) -> RenderResult<Self> {
        let worker = engine.spawn(label).await?;
        let id = worker.id().to_string();
        job.register(&id);
        job.logger().log_worker_leased(&id, label);

        Ok(Self {
            job: job.clone(),
            worker,
            id,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn worker(&mut self) -> &mut dyn TranscodeWorker {
        self.worker.as_mut()
    }

    /// Terminate the worker and end the lease.
    pub async fn release(mut self) -> RenderResult<()> {
        self.released = true;
        self.worker.terminate().await?;
        Ok(())
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if !self.released {
            self.job.logger().log_worker_dropped(&self.id);
        }
        self.job.unregister(&self.id);
    }
}

impl std::fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

#[derive(Debug)]
struct ProgressState {
    clips: Vec<f64>,
    overlays: Vec<f64>,
    composite: f64,
    reported: f64,
}

/// Folds per-worker fractions into one job percent.
///
/// Normalization covers 0 to 50, each clip weighing `1/N` of it. The second
/// half is split across the `M` overlays, each slot being half its own
/// rasterization and half the shared composite pass; with no overlays the
/// composite pass alone drives it.
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    on_progress: ProgressCallback,
}

impl ProgressTracker {
    pub fn new(clip_count: usize, overlay_count: usize, on_progress: ProgressCallback) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                clips: vec![0.0; clip_count],
                overlays: vec![0.0; overlay_count],
                composite: 0.0,
                reported: 0.0,
            }),
            on_progress,
        }
    }

    /// Normalization fraction of clip `index`.
    pub fn clip(&self, index: usize, fraction: f64) {
        self.update(|state| {
            if let Some(slot) = state.clips.get_mut(index) {
                *slot = slot.max(clamp_fraction(fraction));
            }
        });
    }

    /// Rasterization fraction of overlay `index`.
    pub fn overlay(&self, index: usize, fraction: f64) {
        self.update(|state| {
            if let Some(slot) = state.overlays.get_mut(index) {
                *slot = slot.max(clamp_fraction(fraction));
            }
        });
    }

    /// Fraction of the composite encode pass.
    pub fn composite(&self, fraction: f64) {
        self.update(|state| {
            state.composite = state.composite.max(clamp_fraction(fraction));
        });
    }

    /// Force 100%.
    pub fn finish(&self) {
        self.update(|state| {
            state.clips.iter_mut().for_each(|c| *c = 1.0);
            state.overlays.iter_mut().for_each(|o| *o = 1.0);
            state.composite = 1.0;
        });
    }

    /// Last reported percent.
    pub fn percent(&self) -> f64 {
        self.state.lock().map(|s| s.reported).unwrap_or(0.0)
    }

    /// Apply `change` and report. The callback runs under the lock so that
    /// concurrent updates reach it in non-decreasing order.
    fn update(&self, change: impl FnOnce(&mut ProgressState)) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        change(&mut state);
        let percent = aggregate(&state).max(state.reported);
        state.reported = percent;
        (self.on_progress)(percent);
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("percent", &self.percent())
            .finish()
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

fn aggregate(state: &ProgressState) -> f64 {
    let normalize = if state.clips.is_empty() {
        0.0
    } else {
        50.0 * state.clips.iter().sum::<f64>() / state.clips.len() as f64
    };

    let overlay_half = if state.overlays.is_empty() {
        50.0 * state.composite
    } else {
        let slots: f64 = state
            .overlays
            .iter()
            .map(|raster| (raster + state.composite) / 2.0)
            .sum();
        50.0 * slots / state.overlays.len() as f64
    };

    (normalize + overlay_half).min(100.0)
}
