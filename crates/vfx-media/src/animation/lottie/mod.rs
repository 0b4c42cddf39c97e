//! Built-in Lottie engine.
//!
//! Covers the subset transition packs are exported with: shape, solid, null
//! and precomp layers, parenting, layer transforms, and fill/stroke styled
//! rects, ellipses and paths with keyframed properties. Masks, track mattes,
//! text, images and effects are not drawn.

mod model;
mod render;
mod value;

pub use model::{parse_hex_color, Composition, LayerContent, LayerModel, ShapeItem};
pub use render::{render_frame, unit_rgb};
pub use value::{ease, Animatable, Animated, BezierShape, Keyframe};

use resvg::tiny_skia::Pixmap;
use serde_json::Value;
use tracing::debug;

use super::engine::{AnimationEngine, Marker};
use crate::error::{MediaError, MediaResult};

/// Software Lottie renderer on tiny-skia.
#[derive(Debug, Clone, Copy, Default)]
pub struct LottieEngine;

impl LottieEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AnimationEngine for LottieEngine {
    type Handle = Composition;

    fn load(&self, document: &Value) -> MediaResult<Composition> {
        let comp = Composition::parse(document)?;
        debug!(
            width = comp.width,
            height = comp.height,
            frame_rate = comp.frame_rate,
            frames = comp.total_frames(),
            layers = comp.layers.len(),
            "Loaded Lottie composition"
        );
        Ok(comp)
    }

    fn total_frames(&self, handle: &Composition) -> u32 {
        handle.total_frames()
    }

    fn frame_rate(&self, handle: &Composition) -> f64 {
        handle.frame_rate
    }

    fn markers(&self, handle: &Composition) -> Vec<Marker> {
        handle.markers.clone()
    }

    fn intrinsic_size(&self, handle: &Composition) -> (u32, u32) {
        (handle.width.max(0.0).round() as u32, handle.height.max(0.0).round() as u32)
    }

    fn render_frame(&self, handle: &Composition, index: u32, width: u32, height: u32) -> MediaResult<Pixmap> {
        if index >= handle.total_frames() {
            return Err(MediaError::invalid_animation(format!(
                "frame {index} outside [0, {})",
                handle.total_frames()
            )));
        }
        if handle.width <= 0.0 || handle.height <= 0.0 {
            return Err(MediaError::invalid_animation("composition has no size"));
        }
        render_frame(handle, index as f64, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_reports_document_header() {
        let engine = LottieEngine::new();
        let handle = engine
            .load(&json!({
                "fr": 24, "ip": 10, "op": 58, "w": 1080, "h": 1920,
                "layers": [],
                "markers": [{"cm": "Impact", "tm": 22}]
            }))
            .unwrap();

        assert_eq!(engine.total_frames(&handle), 48);
        assert_eq!(engine.frame_rate(&handle), 24.0);
        assert_eq!(engine.intrinsic_size(&handle), (1080, 1920));
        assert_eq!(engine.markers(&handle)[0].time_frame, 12.0);

        assert!(engine.render_frame(&handle, 47, 54, 96).is_ok());
        assert!(matches!(
            engine.render_frame(&handle, 48, 54, 96),
            Err(MediaError::InvalidAnimation(_))
        ));
        engine.destroy(handle);
    }
}
