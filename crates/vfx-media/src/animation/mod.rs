//! Frame-by-frame rasterization of transition animations.
//!
//! [`rasterize`] validates an animation up front and returns a lazy frame
//! sequence. Each frame is rendered, encoded as PNG and handed out one at a
//! time, so at most one decoded surface is alive per sequence.

mod engine;
pub mod lottie;
pub mod palette;

pub use engine::{AnimationEngine, Marker};
pub use lottie::LottieEngine;
pub use palette::{extract_palette, recolor, replace_color, PaletteEntry, Rgba};

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use resvg::tiny_skia::Pixmap;
use serde_json::Value;
use tracing::debug;
use vfx_models::IMPACT_MARKER_NAME;

use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// One encoded frame.
#[derive(Clone)]
pub struct RasterFrame {
    pub index: u32,
    pub png_bytes: Vec<u8>,
}

impl fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterFrame")
            .field("index", &self.index)
            .field("png_bytes", &self.png_bytes.len())
            .finish()
    }
}

/// A validated animation and its frame sequence.
pub struct RasterizedAnimation<E: AnimationEngine> {
    pub frame_rate: f64,
    pub frame_count: u32,
    /// Frame aligned with the cut
    pub marker_frame: u32,
    pub frames: RasterFrames<E>,
}

impl<E: AnimationEngine> fmt::Debug for RasterizedAnimation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterizedAnimation")
            .field("frame_rate", &self.frame_rate)
            .field("frame_count", &self.frame_count)
            .field("marker_frame", &self.marker_frame)
            .finish_non_exhaustive()
    }
}

/// Lazy, finite frame sequence. Iteration consumes it; the engine handle is
/// destroyed once the last frame is produced, on the first error, or on drop.
pub struct RasterFrames<E: AnimationEngine> {
    engine: Arc<E>,
    handle: Option<E::Handle>,
    next: u32,
    count: u32,
    width: u32,
    height: u32,
}

impl<E: AnimationEngine> RasterFrames<E> {
    /// Frames not yet produced.
    pub fn remaining(&self) -> u32 {
        self.count.saturating_sub(self.next)
    }

    /// Skip ahead so that the next frame produced is `index`.
    pub fn skip_to(&mut self, index: u32) {
        self.next = self.next.max(index.min(self.count));
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.destroy(handle);
        }
    }
}

impl<E: AnimationEngine> Iterator for RasterFrames<E> {
    type Item = MediaResult<RasterFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            self.release();
            return None;
        }
        let handle = self.handle.as_ref()?;

        let index = self.next;
        let rendered = self
            .engine
            .render_frame(handle, index, self.width, self.height)
            .and_then(|pixmap| encode_png(&pixmap));

        match rendered {
            Ok(png_bytes) => {
                self.next += 1;
                metrics::record_frames_rasterized(1);
                Some(Ok(RasterFrame { index, png_bytes }))
            }
            Err(e) => {
                self.next = self.count;
                self.release();
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}

impl<E: AnimationEngine> Drop for RasterFrames<E> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Load `document` and prepare its frames at `width × height`.
///
/// The impact marker (named `impact`, any case, else the first marker)
/// must fall inside the animation.
pub fn rasterize<E: AnimationEngine>(
    engine: Arc<E>,
    document: &Value,
    width: u32,
    height: u32,
) -> MediaResult<RasterizedAnimation<E>> {
    if width == 0 || height == 0 {
        return Err(MediaError::validation(format!("raster size {width}x{height} must be positive")));
    }

    let handle = engine.load(document)?;

    let checked = (|| {
        let frame_rate = engine.frame_rate(&handle);
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(MediaError::invalid_animation(format!("invalid frame rate {frame_rate}")));
        }

        let frame_count = engine.total_frames(&handle);
        if frame_count == 0 {
            return Err(MediaError::invalid_animation("animation has no frames"));
        }

        let markers = engine.markers(&handle);
        let marker = markers
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(IMPACT_MARKER_NAME))
            .or_else(|| markers.first())
            .ok_or_else(|| MediaError::invalid_animation("animation has no markers"))?;

        let marker_frame = marker.time_frame.round();
        if !marker_frame.is_finite() || marker_frame < 0.0 || marker_frame >= frame_count as f64 {
            return Err(MediaError::invalid_animation(format!(
                "marker '{}' at frame {} is outside [0, {frame_count})",
                marker.name, marker.time_frame
            )));
        }

        Ok((frame_rate, frame_count, marker_frame as u32))
    })();

    let (frame_rate, frame_count, marker_frame) = match checked {
        Ok(timing) => timing,
        Err(e) => {
            engine.destroy(handle);
            return Err(e);
        }
    };

    debug!(frame_rate, frame_count, marker_frame, width, height, "Prepared animation frames");

    Ok(RasterizedAnimation {
        frame_rate,
        frame_count,
        marker_frame,
        frames: RasterFrames {
            engine,
            handle: Some(handle),
            next: 0,
            count: frame_count,
            width,
            height,
        },
    })
}

/// Encode a premultiplied surface as straight-alpha RGBA PNG.
pub fn encode_png(pixmap: &Pixmap) -> MediaResult<Vec<u8>> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let image = RgbaImage::from_raw(pixmap.width(), pixmap.height(), rgba)
        .ok_or_else(|| MediaError::ImageEncode("pixel buffer does not match surface size".to_string()))?;

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| MediaError::ImageEncode(e.to_string()))?;
    Ok(out.into_inner())
}
