//! Fit-and-letterbox rule shared by the normalizer and the rasterizer.
//!
//! A source wider than the target (by aspect) is fitted to the target width
//! and centered vertically; otherwise it is fitted to the target height and
//! centered horizontally.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Placement of a scaled source inside the target frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Uniform scale applied to the source
    pub scale: f64,
}

/// Compute where a `src_w × src_h` source lands inside `dst_w × dst_h`.
pub fn fit_rect(src_w: f64, src_h: f64, dst_w: f64, dst_h: f64) -> FitRect {
    let src_aspect = src_w / src_h;
    let dst_aspect = dst_w / dst_h;

    let scale = if src_aspect > dst_aspect {
        dst_w / src_w
    } else {
        dst_h / src_h
    };

    let width = src_w * scale;
    let height = src_h * scale;

    FitRect {
        x: (dst_w - width) / 2.0,
        y: (dst_h - height) / 2.0,
        width,
        height,
        scale,
    }
}

/// FFmpeg filter chain applying the same rule to a video stream.
///
/// Pixels are made square first, so anamorphic sources fit by their display
/// aspect. The fitted side is forced to an even size (`-2`) and the result is
/// padded with black to exactly `width × height`.
pub fn scale_pad_filter(width: u32, height: u32) -> String {
    format!(
        "scale=w='iw*sar':h=ih,setsar=1,\
         scale=w='if(gt(a\\,{w}/{h})\\,{w}\\,-2)':h='if(gt(a\\,{w}/{h})\\,-2\\,{h})',\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1",
        w = width,
        h = height
    )
}

/// Round down to the nearest even number (minimum 2).
pub fn round_even(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Reject output sizes the H.264 encoder cannot take.
pub fn validate_target_size(width: u32, height: u32) -> ModelResult<()> {
    if width == 0 || height == 0 {
        return Err(ModelError::validation(format!(
            "target size {width}x{height} must be positive"
        )));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(ModelError::validation(format!(
            "target size {width}x{height} must have even dimensions"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_source_fits_width() {
        let rect = fit_rect(1920.0, 1080.0, 1080.0, 1920.0);
        assert_eq!(rect.width, 1080.0);
        assert_eq!(rect.height, 607.5);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, (1920.0 - 607.5) / 2.0);
    }

    #[test]
    fn test_tall_source_fits_height() {
        let rect = fit_rect(1080.0, 1920.0, 1920.0, 1080.0);
        assert_eq!(rect.height, 1080.0);
        assert_eq!(rect.y, 0.0);
        assert!(rect.x > 0.0);
    }

    #[test]
    fn test_same_aspect_fills_frame() {
        let rect = fit_rect(540.0, 960.0, 1080.0, 1920.0);
        assert_eq!(rect.scale, 2.0);
        assert_eq!((rect.x, rect.y), (0.0, 0.0));
    }

    #[test]
    fn test_filter_expression() {
        let filter = scale_pad_filter(1080, 1920);
        assert!(filter.starts_with("scale=w='iw*sar':h=ih,setsar=1,scale=w='if(gt(a\\,1080/1920)\\,1080\\,-2)'"));
        assert!(filter.contains("pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=black"));
        assert!(filter.ends_with("setsar=1"));
    }

    #[test]
    fn test_even_sizes() {
        assert_eq!(round_even(1081), 1080);
        assert_eq!(round_even(1), 2);
        assert!(validate_target_size(1080, 1920).is_ok());
        assert!(validate_target_size(1081, 1920).is_err());
        assert!(validate_target_size(0, 1920).is_err());
    }
}
