#![deny(unreachable_patterns)]
//! Media stages of the transition renderer.
//!
//! This crate provides:
//! - The transcoding engine capability and its FFmpeg process implementation
//! - Type-safe FFmpeg command building and `-progress pipe:2` parsing
//! - Clip normalization, stream-copy concatenation and overlay compositing
//! - Lottie rasterization on tiny-skia, plus palette editing
//! - Cancellation support via tokio

pub mod animation;
pub mod cancel;
pub mod command;
pub mod composite;
pub mod concat;
pub mod error;
pub mod ffmpeg_worker;
pub mod filters;
pub mod log_probe;
pub mod metrics;
pub mod normalize;
pub mod probe;
pub mod progress;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod worker;

pub use animation::{
    encode_png, extract_palette, rasterize, recolor, replace_color, AnimationEngine, LottieEngine, Marker,
    PaletteEntry, RasterFrame, RasterFrames, RasterizedAnimation, Rgba,
};
pub use cancel::{CancelHandle, CancelSignal};
pub use command::FfmpegCommand;
pub use composite::{CompositeEvent, CompositeEventHandler, CompositeGraphBuilder, CompositeInputs, OverlaySource};
pub use concat::ConcatAssembler;
pub use error::{MediaError, MediaResult};
pub use ffmpeg_worker::{check_ffmpeg, check_ffprobe, FfmpegEngine, FfmpegWorker};
pub use log_probe::SourceProbe;
pub use normalize::{ClipNormalizer, NormalizeEvent, NormalizeEventHandler, NormalizedClip};
pub use probe::{probe_rendered, RenderedInfo};
pub use progress::{FfmpegProgress, ProgressParser};
pub use worker::{ExitStatus, TranscodeEngine, TranscodeWorker, WorkerEvent, WorkerEventHandler};
