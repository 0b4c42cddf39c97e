//! Animation engine capability.

use resvg::tiny_skia::Pixmap;
use serde::Serialize;
use serde_json::Value;

use crate::error::MediaResult;

/// A named frame of an animation timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub name: String,
    /// Frame relative to the animation's first frame
    pub time_frame: f64,
}

/// Loads vector animations and renders single frames off-screen.
///
/// Rendering is synchronous and CPU-bound; callers run it on the blocking
/// pool.
pub trait AnimationEngine: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Parse a document into a renderable handle.
    fn load(&self, document: &Value) -> MediaResult<Self::Handle>;

    fn total_frames(&self, handle: &Self::Handle) -> u32;

    fn frame_rate(&self, handle: &Self::Handle) -> f64;

    fn markers(&self, handle: &Self::Handle) -> Vec<Marker>;

    /// Native composition size.
    fn intrinsic_size(&self, handle: &Self::Handle) -> (u32, u32);

    /// Render frame `index` into a transparent `width × height` surface with
    /// the animation fitted and centered.
    fn render_frame(&self, handle: &Self::Handle, index: u32, width: u32, height: u32) -> MediaResult<Pixmap>;

    /// Release the handle.
    fn destroy(&self, handle: Self::Handle) {
        drop(handle);
    }
}
