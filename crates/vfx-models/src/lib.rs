//! Shared data models for the transition renderer.
//!
//! This crate provides pure types and math for:
//! - Media segments and trim windows
//! - Transition descriptors built from Lottie documents
//! - The ordered layer list and transition placement
//! - Timeline merge points and transition windows
//! - The shared fit/letterbox rule and aspect presets
//! - Encoding profile and render stages

pub mod aspect;
pub mod encoding;
pub mod error;
pub mod fit;
pub mod job;
pub mod layer;
pub mod segment;
pub mod timeline;
pub mod transition;

// Re-export common types
pub use aspect::{AspectPreset, AspectPresetParseError};
pub use encoding::EncodingProfile;
pub use error::{ModelError, ModelResult};
pub use fit::{fit_rect, round_even, scale_pad_filter, validate_target_size, FitRect};
pub use job::{JobId, RenderStage};
pub use layer::{Layer, LayerPlan, PlacedTransition};
pub use segment::{MediaSegment, TrimWindow};
pub use timeline::{
    compute_merge_points, compute_windows, effective_duration, preview_frame_at, validate_placement,
    PreviewFrame, Timeline, TransitionWindow,
};
pub use transition::{TransitionDescriptor, IMPACT_MARKER_NAME};
