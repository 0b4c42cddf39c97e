//! Overlay compositing.
//!
//! The assembled video is input 0. Each transition becomes a PNG image
//! sequence input, shifted to its window with `-itsoffset`, and the whole
//! stack is encoded in a single pass.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use vfx_models::{EncodingProfile, TransitionWindow};

use crate::animation::{AnimationEngine, RasterFrame, RasterFrames};
use crate::cancel::CancelSignal;
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::build_composite_graph;
use crate::worker::{TranscodeWorker, WorkerEvent};

/// Scratch name of the base video.
pub const BASE_INPUT: &str = "base.mp4";
/// Scratch name of the composited output.
pub const COMPOSITE_OUTPUT: &str = "output.mp4";

/// Scratch name of frame `frame` of overlay input `slot`.
pub fn overlay_frame_name(slot: usize, frame: u32) -> String {
    format!("ov{slot}_{frame:05}.png")
}

/// Image-sequence pattern of overlay input `slot`.
pub fn overlay_pattern(slot: usize) -> String {
    format!("ov{slot}_%05d.png")
}

/// Frames of one transition, paired positionally with its window.
pub struct OverlaySource<E: AnimationEngine> {
    pub frames: RasterFrames<E>,
    pub frame_rate: f64,
}

impl<E: AnimationEngine> std::fmt::Debug for OverlaySource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySource")
            .field("remaining", &self.frames.remaining())
            .field("frame_rate", &self.frame_rate)
            .finish()
    }
}

/// Event reported while compositing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositeEvent {
    /// Rasterization fraction of one overlay (by window index)
    Rasterized { transition: usize, fraction: f64 },
    /// Monotonic fraction of the encode pass
    Progress(f64),
}

/// Receives composite events.
pub type CompositeEventHandler = Arc<dyn Fn(CompositeEvent) + Send + Sync>;

/// What one composite pass draws.
pub struct CompositeInputs<'a, E: AnimationEngine> {
    /// Concatenated clips, input 0
    pub base_video: &'a [u8],
    /// Output length; overlays never extend it
    pub base_duration: f64,
    /// `overlays[i]` plays in `windows[i]`
    pub overlays: Vec<OverlaySource<E>>,
    pub windows: &'a [TransitionWindow],
}

impl<E: AnimationEngine> std::fmt::Debug for CompositeInputs<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeInputs")
            .field("base_len", &self.base_video.len())
            .field("base_duration", &self.base_duration)
            .field("overlays", &self.overlays)
            .field("windows", &self.windows)
            .finish()
    }
}

/// Placement of one overlay input in the composite command.
#[derive(Debug, Clone, Copy)]
struct OverlayInput {
    slot: usize,
    start: f64,
    first_frame: u32,
    frame_rate: f64,
}

/// Builds and runs the composite pass.
#[derive(Debug, Clone)]
pub struct CompositeGraphBuilder {
    width: u32,
    height: u32,
    profile: EncodingProfile,
}

impl CompositeGraphBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            profile: EncodingProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: EncodingProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Composite the overlays over the base video and return the encoded
    /// result.
    ///
    /// Overlays are stacked in order of window start, so a later window
    /// draws on top of an earlier one where they overlap.
    pub async fn build_and_render<E: AnimationEngine>(
        &self,
        worker: &mut dyn TranscodeWorker,
        inputs: CompositeInputs<'_, E>,
        cancel: &CancelSignal,
        on_event: CompositeEventHandler,
    ) -> MediaResult<Vec<u8>> {
        let CompositeInputs {
            base_video,
            base_duration,
            overlays,
            windows,
        } = inputs;

        if overlays.len() != windows.len() {
            return Err(MediaError::validation(format!(
                "{} overlays for {} transition windows",
                overlays.len(),
                windows.len()
            )));
        }

        let mut paired: Vec<(TransitionWindow, OverlaySource<E>)> =
            windows.iter().copied().zip(overlays).collect();
        paired.sort_by(|a, b| a.0.start.total_cmp(&b.0.start));

        for pair in paired.windows(2) {
            if pair[0].0.overlaps(&pair[1].0) {
                warn!(
                    first = pair[0].0.index,
                    second = pair[1].0.index,
                    "Transition windows overlap; the later one draws on top"
                );
            }
        }

        worker.write_input(BASE_INPUT, base_video).await?;

        let mut files = Vec::new();
        let mut placed = Vec::with_capacity(paired.len());
        let mut sorted_windows = Vec::with_capacity(paired.len());

        for (slot, (window, overlay)) in paired.into_iter().enumerate() {
            let first_frame = window.skipped_frames();
            let frame_rate = overlay.frame_rate;
            let written = self
                .stream_frames(worker, slot, &window, overlay.frames, cancel, &on_event)
                .await?;
            files.extend(written);

            placed.push(OverlayInput {
                slot,
                start: window.start,
                first_frame,
                frame_rate,
            });
            sorted_windows.push(window);
        }

        let args = self.build_args(&placed, &sorted_windows, base_duration);

        let best = Arc::new(Mutex::new(0.0f64));
        {
            let best = best.clone();
            let on_event = on_event.clone();
            worker.set_event_handler(Some(Arc::new(move |event: WorkerEvent| {
                let WorkerEvent::Progress(progress) = event else {
                    return;
                };
                let fraction = match best.lock() {
                    Ok(mut best) => {
                        *best = best.max(progress.fraction(base_duration));
                        *best
                    }
                    Err(_) => return,
                };
                on_event(CompositeEvent::Progress(fraction));
            })));
        }

        info!(
            overlays = placed.len(),
            width = self.width,
            height = self.height,
            base_duration,
            "Compositing transitions"
        );

        let status = worker.execute(&args, cancel).await;
        worker.set_event_handler(None);
        status?.check("composite")?;

        let output = worker.read_output(COMPOSITE_OUTPUT).await?;

        worker.delete_file(BASE_INPUT).await?;
        for name in &files {
            worker.delete_file(name).await?;
        }
        worker.delete_file(COMPOSITE_OUTPUT).await?;

        on_event(CompositeEvent::Progress(1.0));
        debug!(bytes = output.len(), "Composite finished");
        Ok(output)
    }

    /// Render the overlay frames on the blocking pool and write each one
    /// into the worker as soon as it exists.
    async fn stream_frames<E: AnimationEngine>(
        &self,
        worker: &mut dyn TranscodeWorker,
        slot: usize,
        window: &TransitionWindow,
        mut frames: RasterFrames<E>,
        cancel: &CancelSignal,
        on_event: &CompositeEventHandler,
    ) -> MediaResult<Vec<String>> {
        frames.skip_to(window.skipped_frames());
        let total = frames.remaining().max(1) as f64;
        let mut written = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled);
            }

            let (rest, next) = tokio::task::spawn_blocking(move || {
                let next = frames.next();
                (frames, next)
            })
            .await
            .map_err(|e| MediaError::internal(format!("rasterizer task failed: {e}")))?;
            frames = rest;

            let Some(frame) = next else {
                break;
            };
            let RasterFrame { index, png_bytes } = frame?;

            let name = overlay_frame_name(slot, index);
            worker.write_input(&name, &png_bytes).await?;
            written.push(name);

            on_event(CompositeEvent::Rasterized {
                transition: window.index,
                fraction: written.len() as f64 / total,
            });
        }

        debug!(slot, transition = window.index, frames = written.len(), "Overlay frames written");
        Ok(written)
    }

    /// Arguments of the composite pass.
    fn build_args(&self, inputs: &[OverlayInput], windows: &[TransitionWindow], base_duration: f64) -> Vec<String> {
        let mut cmd = FfmpegCommand::new(COMPOSITE_OUTPUT).input(BASE_INPUT);

        for input in inputs {
            cmd = cmd
                .input_args([
                    "-framerate".to_string(),
                    format!("{}", input.frame_rate),
                    "-start_number".to_string(),
                    input.first_frame.to_string(),
                    "-itsoffset".to_string(),
                    format!("{:.3}", input.start),
                ])
                .input(overlay_pattern(input.slot));
        }

        let (graph, last) = build_composite_graph(windows, self.width, self.height);

        cmd.filter_complex(graph)
            .map(format!("[{last}]"))
            .map("0:a?")
            .output_args(self.profile.to_ffmpeg_args())
            .output_args(["-t".to_string(), format!("{base_duration:.3}")])
            .output_args(["-movflags", "+faststart"])
            .build_args()
    }
}
