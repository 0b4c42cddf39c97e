//! Render coordinator.
//!
//! Drives one render through its stages:
//!
//! 1. Validate the request (no worker is spawned before this passes)
//! 2. Normalize every clip concurrently, one worker each
//! 3. Concatenate the clips and derive the timeline from measured durations
//! 4. Rasterize each transition and composite it over the assembled video
//!
//! The whole pipeline races the job's cancellation signal. Workers are held
//! through [`WorkerLease`]s, so dropping the pipeline on cancel or failure
//! kills their processes and removes their scratch.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, Instrument};
use vfx_media::{
    rasterize, AnimationEngine, CancelSignal, ClipNormalizer, CompositeEvent, CompositeEventHandler,
    CompositeGraphBuilder, CompositeInputs, ConcatAssembler, LottieEngine, NormalizeEvent, NormalizeEventHandler,
    NormalizedClip, OverlaySource, TranscodeEngine,
};
use vfx_models::{
    validate_placement, validate_target_size, EncodingProfile, Layer, LayerPlan, MediaSegment, PlacedTransition,
    RenderStage, Timeline,
};

use crate::config::WorkerConfig;
use crate::error::{RenderError, RenderResult};
use crate::job::{ProgressCallback, ProgressTracker, RenderJob, WorkerLease};
use crate::metrics;

/// Worker label for clip normalization.
pub const NORMALIZE_LABEL: &str = "normalize";
/// Worker label for concatenation and compositing.
pub const ASSEMBLE_LABEL: &str = "assemble";

/// Clips, placed transitions and output size of one render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub segments: Vec<MediaSegment>,
    pub transitions: Vec<PlacedTransition>,
    pub width: u32,
    pub height: u32,
}

impl RenderRequest {
    pub fn new(segments: Vec<MediaSegment>, transitions: Vec<PlacedTransition>, width: u32, height: u32) -> Self {
        Self {
            segments,
            transitions,
            width,
            height,
        }
    }

    /// Build a request from an ordered layer list.
    pub fn from_layers(layers: Vec<Layer>, width: u32, height: u32) -> RenderResult<Self> {
        let plan = LayerPlan::from_layers(layers)?;
        Ok(Self::new(plan.segments, plan.transitions, width, height))
    }

    /// Check everything that can be checked without a worker.
    pub fn validate(&self) -> RenderResult<()> {
        if self.segments.is_empty() {
            return Err(RenderError::validation("render needs at least one media segment"));
        }

        validate_target_size(self.width, self.height)?;

        for (index, segment) in self.segments.iter().enumerate() {
            if segment.source.is_empty() {
                return Err(RenderError::validation(format!(
                    "segment {index} ('{}') has no source bytes",
                    segment.name
                )));
            }
            segment.trim_window()?;
        }

        validate_placement(self.segments.len(), &self.transitions)?;
        Ok(())
    }
}

/// Runs render jobs against a transcoding engine and an animation engine.
pub struct RenderCoordinator<A: AnimationEngine = LottieEngine> {
    engine: Arc<dyn TranscodeEngine>,
    animation: Arc<A>,
    profile: EncodingProfile,
    max_parallel: Option<usize>,
}

impl RenderCoordinator<LottieEngine> {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self {
            engine,
            animation: Arc::new(LottieEngine::new()),
            profile: EncodingProfile::default(),
            max_parallel: None,
        }
    }

    /// Coordinator using the profile and parallelism from `config`.
    pub fn from_config(engine: Arc<dyn TranscodeEngine>, config: &WorkerConfig) -> Self {
        Self::new(engine)
            .with_profile(config.encoding_profile())
            .with_max_parallel(config.max_parallel)
    }
}

impl<A: AnimationEngine> RenderCoordinator<A> {
    /// Swap the animation engine.
    pub fn with_animation_engine<B: AnimationEngine>(self, animation: Arc<B>) -> RenderCoordinator<B> {
        RenderCoordinator {
            engine: self.engine,
            animation,
            profile: self.profile,
            max_parallel: self.max_parallel,
        }
    }

    pub fn with_profile(mut self, profile: EncodingProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Cap concurrent normalizations. `None` runs every clip at once.
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel.filter(|n| *n > 0);
        self
    }

    /// Render `request` into one encoded video.
    pub async fn render(
        &self,
        request: RenderRequest,
        on_progress: ProgressCallback,
        cancel: CancelSignal,
    ) -> RenderResult<Vec<u8>> {
        let job = Arc::new(RenderJob::new("render", cancel));
        self.run(job, request, on_progress).await
    }

    /// Render an ordered layer list of media and transition layers.
    pub async fn render_layers(
        &self,
        layers: Vec<Layer>,
        width: u32,
        height: u32,
        on_progress: ProgressCallback,
        cancel: CancelSignal,
    ) -> RenderResult<Vec<u8>> {
        let job = Arc::new(RenderJob::new("render_layers", cancel));
        match RenderRequest::from_layers(layers, width, height) {
            Ok(request) => self.run(job, request, on_progress).await,
            Err(e) => {
                job.logger().log_failed(&e);
                job.set_stage(RenderStage::Failed);
                Err(e)
            }
        }
    }

    /// Run `request` under an existing job, so callers can watch its stage
    /// and live workers while it runs.
    ///
    /// Resolves with exactly one outcome; the job ends in `Done`,
    /// `Cancelled` or `Failed` with no worker left alive.
    pub async fn run(
        &self,
        job: Arc<RenderJob>,
        request: RenderRequest,
        on_progress: ProgressCallback,
    ) -> RenderResult<Vec<u8>> {
        let span = job.logger().span();
        self.run_job(job, request, on_progress).instrument(span).await
    }

    async fn run_job(
        &self,
        job: Arc<RenderJob>,
        request: RenderRequest,
        on_progress: ProgressCallback,
    ) -> RenderResult<Vec<u8>> {
        let logger = job.logger().clone();
        logger.log_request(
            request.segments.len(),
            request.transitions.len(),
            request.width,
            request.height,
        );

        let result = match request.validate() {
            Ok(()) => self.run_validated(&job, &request, on_progress).await,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(bytes) => {
                job.set_stage(RenderStage::Done);
                logger.log_done(bytes.len());
                "done"
            }
            Err(RenderError::Cancelled) => {
                job.set_stage(RenderStage::Cancelled);
                logger.log_cancelled();
                "cancelled"
            }
            Err(e) => {
                job.set_stage(RenderStage::Failed);
                logger.log_failed(e);
                "failed"
            }
        };
        metrics::record_render(outcome, logger.elapsed().as_secs_f64());

        let live = job.live_workers();
        if live != 0 {
            error!(live, workers = ?job.live_worker_ids(), "Render resolved with workers still leased");
        }
        debug_assert_eq!(live, 0, "workers leaked by render job");

        result
    }

    async fn run_validated(
        &self,
        job: &Arc<RenderJob>,
        request: &RenderRequest,
        on_progress: ProgressCallback,
    ) -> RenderResult<Vec<u8>> {
        let progress = {
            let job = job.clone();
            Arc::new(ProgressTracker::new(
                request.segments.len(),
                request.transitions.len(),
                Arc::new(move |percent: f64| {
                    job.record_progress(percent);
                    on_progress(percent);
                }),
            ))
        };

        let mut cancel = job.cancel_signal();
        let mut pipeline = Box::pin(self.pipeline(job, request, &progress));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RenderError::Cancelled),
            result = &mut pipeline => result,
        };

        if result.as_ref().is_err_and(RenderError::is_cancelled) || job.is_cancelled() {
            job.set_stage(RenderStage::Cancelling);
            // Dropping the pipeline drops every lease it still holds.
            drop(pipeline);
            return Err(RenderError::Cancelled);
        }
        drop(pipeline);

        if result.is_ok() {
            progress.finish();
        }
        result
    }

    async fn pipeline(
        &self,
        job: &Arc<RenderJob>,
        request: &RenderRequest,
        progress: &Arc<ProgressTracker>,
    ) -> RenderResult<Vec<u8>> {
        let cancel = job.cancel_signal();

        job.set_stage(RenderStage::Normalizing);
        let clips = self.normalize_all(job, request, progress, &cancel).await?;

        job.set_stage(RenderStage::Concatenating);
        let durations: Vec<f64> = clips.iter().map(|c| c.measured_duration).collect();
        let timeline = Timeline::build(&durations, &request.transitions)?;
        debug!(merge_points = ?timeline.merge_points, windows = timeline.windows.len(), "Timeline built");

        for (first, second) in timeline.overlapping_windows() {
            job.logger().log_overlap(first, second);
        }

        let mut lease = WorkerLease::acquire(job, self.engine.as_ref(), ASSEMBLE_LABEL).await?;
        let encoded: Vec<Vec<u8>> = clips.into_iter().map(|c| c.encoded_bytes).collect();
        let base = ConcatAssembler::new().concat(lease.worker(), &encoded, &cancel).await?;
        drop(encoded);

        let overlays = if timeline.windows.is_empty() {
            job.set_stage(RenderStage::Compositing);
            Vec::new()
        } else {
            job.set_stage(RenderStage::Rasterizing);
            self.prepare_overlays(request, &timeline).await?
        };

        let on_event: CompositeEventHandler = {
            let job = job.clone();
            let progress = progress.clone();
            Arc::new(move |event: CompositeEvent| match event {
                CompositeEvent::Rasterized { transition, fraction } => progress.overlay(transition, fraction),
                CompositeEvent::Progress(fraction) => {
                    if job.stage() == RenderStage::Rasterizing {
                        job.set_stage(RenderStage::Compositing);
                    }
                    progress.composite(fraction);
                }
            })
        };

        let output = CompositeGraphBuilder::new(request.width, request.height)
            .with_profile(self.profile.clone())
            .build_and_render(
                lease.worker(),
                CompositeInputs {
                    base_video: &base,
                    base_duration: timeline.total_duration(),
                    overlays,
                    windows: &timeline.windows,
                },
                &cancel,
                on_event,
            )
            .await?;

        lease.release().await?;
        Ok(output)
    }

    /// Normalize every segment, one leased worker each.
    ///
    /// The first failure drops the remaining futures, which discards their
    /// workers.
    async fn normalize_all(
        &self,
        job: &Arc<RenderJob>,
        request: &RenderRequest,
        progress: &Arc<ProgressTracker>,
        cancel: &CancelSignal,
    ) -> RenderResult<Vec<NormalizedClip>> {
        let normalizer = ClipNormalizer::new(request.width, request.height).with_profile(self.profile.clone());
        let limiter = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            segments = request.segments.len(),
            max_parallel = ?self.max_parallel,
            "Normalizing clips"
        );

        let tasks = request.segments.iter().enumerate().map(|(index, segment)| {
            let normalizer = &normalizer;
            let limiter = limiter.clone();
            let progress = progress.clone();

            async move {
                let _permit = match &limiter {
                    Some(limiter) => Some(
                        limiter
                            .acquire()
                            .await
                            .map_err(|e| RenderError::worker_failure(NORMALIZE_LABEL, None, e.to_string()))?,
                    ),
                    None => None,
                };

                let mut lease = WorkerLease::acquire(job, self.engine.as_ref(), NORMALIZE_LABEL).await?;
                let on_event: NormalizeEventHandler = {
                    let progress = progress.clone();
                    Arc::new(move |event: NormalizeEvent| match event {
                        NormalizeEvent::Progress(fraction) => progress.clip(index, fraction),
                        NormalizeEvent::NativeDuration(secs) => {
                            debug!(segment = index, native_duration = secs, "Source probed")
                        }
                    })
                };

                let clip = normalizer
                    .normalize(lease.worker(), index, segment, cancel, on_event)
                    .await?;
                lease.release().await?;
                progress.clip(index, 1.0);
                Ok::<_, RenderError>(clip)
            }
        });

        try_join_all(tasks).await
    }

    /// Load every transition's animation in window order.
    async fn prepare_overlays(
        &self,
        request: &RenderRequest,
        timeline: &Timeline,
    ) -> RenderResult<Vec<OverlaySource<A>>> {
        let mut overlays = Vec::with_capacity(timeline.windows.len());

        for window in &timeline.windows {
            let descriptor = request
                .transitions
                .get(window.index)
                .map(|placed| &placed.descriptor)
                .ok_or_else(|| RenderError::validation(format!("no transition for window {}", window.index)))?;

            let engine = self.animation.clone();
            let document = descriptor.document.clone();
            let (width, height) = (request.width, request.height);
            let animation = tokio::task::spawn_blocking(move || rasterize(engine, &document, width, height))
                .await
                .map_err(|e| RenderError::worker_failure("rasterize", None, e.to_string()))??;

            debug!(
                transition = %descriptor.name,
                start = window.start,
                impact = window.impact,
                frames = animation.frame_count,
                skipped = window.skipped_frames(),
                "Transition loaded"
            );

            overlays.push(OverlaySource {
                frame_rate: animation.frame_rate,
                frames: animation.frames,
            });
        }

        Ok(overlays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use vfx_media::testing::{FakeEngine, FakeScript};
    use vfx_media::CancelHandle;
    use vfx_models::TransitionDescriptor;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 36;

    fn transition(name: &str) -> TransitionDescriptor {
        let doc = json!({
            "fr": 30, "ip": 0, "op": 30, "w": 100, "h": 100,
            "layers": [{"ty": 1, "sc": "#00ff00", "sw": 100, "sh": 100, "ip": 0, "op": 30, "ks": {}}],
            "markers": [{"cm": "impact", "tm": 15}]
        });
        TransitionDescriptor::from_document(name, doc).unwrap()
    }

    fn segment(name: &str) -> MediaSegment {
        MediaSegment::new(name, vec![0u8; 16], "video/mp4")
    }

    fn request(segments: usize, transitions: usize) -> RenderRequest {
        RenderRequest::new(
            (0..segments).map(|i| segment(&format!("clip{i}.mp4"))).collect(),
            PlacedTransition::sequential((0..transitions).map(|i| transition(&format!("t{i}"))).collect()),
            WIDTH,
            HEIGHT,
        )
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |p: f64| sink.lock().unwrap().push(p)), seen)
    }

    fn coordinator(engine: &FakeEngine) -> RenderCoordinator {
        RenderCoordinator::new(Arc::new(engine.clone()))
    }

    fn composite_args(engine: &FakeEngine) -> Vec<String> {
        engine
            .stats()
            .commands()
            .into_iter()
            .filter(|(label, args)| label == ASSEMBLE_LABEL && args.last().map(String::as_str) == Some("output.mp4"))
            .map(|(_, args)| args)
            .last()
            .unwrap()
    }

    fn follows(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[tokio::test]
    async fn test_too_many_transitions_fail_before_any_spawn() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, seen) = recorder();
        let job = Arc::new(RenderJob::new("render", CancelSignal::never()));

        let result = coordinator(&engine).run(job.clone(), request(3, 3), callback).await;

        assert!(matches!(result, Err(RenderError::Validation(_))));
        assert_eq!(engine.stats().spawned(), 0);
        assert_eq!(job.stage(), RenderStage::Failed);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_odd_size_fails_validation() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, _) = recorder();
        let mut req = request(2, 1);
        req.width = 63;

        let result = coordinator(&engine).render(req, callback, CancelSignal::never()).await;
        assert!(matches!(result, Err(RenderError::Validation(_))));
        assert_eq!(engine.stats().spawned(), 0);
    }

    #[tokio::test]
    async fn test_render_places_transition_at_cut() {
        let engine = FakeEngine::new(FakeScript::default().with_source_duration(10.0));
        let (callback, seen) = recorder();
        let job = Arc::new(RenderJob::new("render", CancelSignal::never()));

        let output = coordinator(&engine)
            .run(job.clone(), request(2, 1), callback)
            .await
            .unwrap();

        assert!(String::from_utf8(output).unwrap().starts_with("fake:output.mp4:2:"));
        assert_eq!(job.stage(), RenderStage::Done);
        assert_eq!(job.live_workers(), 0);
        assert_eq!(engine.stats().live(), 0);
        // two normalize workers plus one for concat and composite
        assert_eq!(engine.stats().spawned(), 3);

        let args = composite_args(&engine);
        assert!(follows(&args, "-itsoffset", "9.500"));
        assert!(follows(&args, "-start_number", "0"));
        assert!(follows(&args, "-t", "20.000"));

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
        assert_eq!(job.progress(), 100.0);
    }

    #[tokio::test]
    async fn test_zero_transitions_still_composites() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, seen) = recorder();
        let job = Arc::new(RenderJob::new("render", CancelSignal::never()));

        let output = coordinator(&engine)
            .run(job.clone(), request(3, 0), callback)
            .await
            .unwrap();

        assert!(String::from_utf8(output).unwrap().starts_with("fake:output.mp4:1:"));
        assert_eq!(job.stage(), RenderStage::Done);
        assert!(follows(&composite_args(&engine), "-t", "30.000"));
        assert_eq!(*seen.lock().unwrap().last().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_first_boundary_clamps_to_zero() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, _) = recorder();
        let req = RenderRequest::new(
            vec![
                segment("a.mp4").with_trim(0.0, 0.3),
                segment("b.mp4").with_trim(1.0, 2.0),
            ],
            PlacedTransition::sequential(vec![transition("t0")]),
            WIDTH,
            HEIGHT,
        );

        coordinator(&engine)
            .render(req, callback, CancelSignal::never())
            .await
            .unwrap();

        let args = composite_args(&engine);
        // 0.3 - 0.5 pre-roll clamps to 0, dropping 0.2s = 6 frames
        assert!(follows(&args, "-itsoffset", "0.000"));
        assert!(follows(&args, "-start_number", "6"));
        assert!(follows(&args, "-t", "1.300"));
    }

    #[tokio::test]
    async fn test_render_layers_binds_transition_between_media() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, _) = recorder();
        let layers = vec![
            Layer::Media(segment("a.mp4")),
            Layer::Transition(transition("t0")),
            Layer::Media(segment("b.mp4")),
        ];

        coordinator(&engine)
            .render_layers(layers, WIDTH, HEIGHT, callback, CancelSignal::never())
            .await
            .unwrap();
        assert!(follows(&composite_args(&engine), "-itsoffset", "9.500"));
    }

    #[tokio::test]
    async fn test_leading_transition_layer_is_rejected() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, _) = recorder();
        let layers = vec![Layer::Transition(transition("t0")), Layer::Media(segment("a.mp4"))];

        let result = coordinator(&engine)
            .render_layers(layers, WIDTH, HEIGHT, callback, CancelSignal::never())
            .await;
        assert!(matches!(result, Err(RenderError::Validation(_))));
        assert_eq!(engine.stats().spawned(), 0);
    }

    #[tokio::test]
    async fn test_cancel_terminates_every_worker() {
        let engine = FakeEngine::new(FakeScript::default().hang_in_stage(NORMALIZE_LABEL));
        let stats = engine.stats();
        let handle = CancelHandle::new();
        let job = Arc::new(RenderJob::new("render", handle.signal()));
        let (callback, _) = recorder();

        let task = {
            let job = job.clone();
            let coordinator = coordinator(&engine);
            tokio::spawn(async move { coordinator.run(job, request(2, 1), callback).await })
        };

        while job.live_workers() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(job.stage(), RenderStage::Normalizing);
        handle.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RenderError::Cancelled)));
        assert_eq!(job.stage(), RenderStage::Cancelled);
        assert_eq!(job.live_workers(), 0);
        assert_eq!(stats.live(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start_spawns_nothing() {
        let engine = FakeEngine::new(FakeScript::default());
        let handle = CancelHandle::new();
        handle.cancel();
        let (callback, _) = recorder();

        let result = coordinator(&engine)
            .render(request(2, 1), callback, handle.signal())
            .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(engine.stats().spawned(), 0);
    }

    #[tokio::test]
    async fn test_assemble_failure_fails_job() {
        let engine = FakeEngine::new(FakeScript::default().fail_in_stage(ASSEMBLE_LABEL, 1));
        let job = Arc::new(RenderJob::new("render", CancelSignal::never()));
        let (callback, _) = recorder();

        let result = coordinator(&engine).run(job.clone(), request(2, 1), callback).await;

        match result {
            Err(RenderError::WorkerFailure { stage, exit_code, .. }) => {
                assert_eq!(stage, "concat");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(job.stage(), RenderStage::Failed);
        assert_eq!(job.live_workers(), 0);
        assert_eq!(engine.stats().live(), 0);
    }

    #[tokio::test]
    async fn test_clip_without_video_is_decode_error() {
        let engine = FakeEngine::new(FakeScript::default().audio_only());
        let (callback, _) = recorder();

        let result = coordinator(&engine)
            .render(request(2, 0), callback, CancelSignal::never())
            .await;
        assert!(matches!(result, Err(RenderError::Decode { .. })));
        assert_eq!(engine.stats().live(), 0);
    }

    #[tokio::test]
    async fn test_max_parallel_serializes_normalization() {
        let engine = FakeEngine::new(FakeScript::default());
        let (callback, _) = recorder();

        coordinator(&engine)
            .with_max_parallel(Some(1))
            .render(request(3, 0), callback, CancelSignal::never())
            .await
            .unwrap();

        let probes: Vec<bool> = engine
            .stats()
            .commands()
            .into_iter()
            .filter(|(label, _)| label == NORMALIZE_LABEL)
            .map(|(_, args)| args.first().map(String::as_str) == Some("-hide_banner"))
            .collect();
        // each clip finishes its transcode before the next one is probed
        assert_eq!(probes, vec![true, false, true, false, true, false]);
    }
}
