//! Transition descriptors built from Lottie documents.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// Name of the marker that pins the impact frame to the cut.
pub const IMPACT_MARKER_NAME: &str = "impact";

/// A vector-animation transition and the timing needed to place it.
///
/// `impact_marker_frame / frame_rate` seconds of the animation play before the
/// cut (the pre-roll); the rest plays after it.
#[derive(Debug, Clone)]
pub struct TransitionDescriptor {
    /// Display name used in logs and errors
    pub name: String,
    /// Parsed Lottie document
    pub document: Arc<Value>,
    /// Frame (relative to the animation start) aligned with the cut
    pub impact_marker_frame: u32,
    /// Animation frame rate
    pub frame_rate: f64,
    /// Number of frames in the animation
    pub total_frames: u32,
    /// Composition width
    pub intrinsic_width: u32,
    /// Composition height
    pub intrinsic_height: u32,
}

/// Top-level Lottie fields needed for timing.
#[derive(Debug, Deserialize)]
struct LottieHeader {
    fr: f64,
    ip: f64,
    op: f64,
    w: f64,
    h: f64,
    #[serde(default)]
    markers: Vec<LottieMarker>,
}

#[derive(Debug, Deserialize)]
struct LottieMarker {
    #[serde(default)]
    cm: String,
    tm: f64,
}

impl TransitionDescriptor {
    /// Parse a Lottie document from raw JSON bytes.
    pub fn from_slice(name: impl Into<String>, bytes: &[u8]) -> ModelResult<Self> {
        let name = name.into();
        let document: Value =
            serde_json::from_slice(bytes).map_err(|e| ModelError::decode(&name, e.to_string()))?;
        Self::from_document(name, document)
    }

    /// Build a descriptor from a parsed Lottie document.
    ///
    /// The impact marker is the marker named `impact` (any case) or, failing
    /// that, the first marker. Its time is made relative to the in point.
    pub fn from_document(name: impl Into<String>, document: Value) -> ModelResult<Self> {
        let name = name.into();
        let header = LottieHeader::deserialize(&document)
            .map_err(|e| ModelError::decode(&name, e.to_string()))?;

        if !header.fr.is_finite() || header.fr <= 0.0 {
            return Err(ModelError::invalid_animation(format!(
                "'{name}' has invalid frame rate {}",
                header.fr
            )));
        }

        let span = (header.op - header.ip).round();
        if !span.is_finite() || span < 1.0 {
            return Err(ModelError::invalid_animation(format!(
                "'{name}' has no frames (ip={}, op={})",
                header.ip, header.op
            )));
        }

        if header.w < 1.0 || header.h < 1.0 {
            return Err(ModelError::invalid_animation(format!(
                "'{name}' has invalid size {}x{}",
                header.w, header.h
            )));
        }

        let marker = header
            .markers
            .iter()
            .find(|m| m.cm.eq_ignore_ascii_case(IMPACT_MARKER_NAME))
            .or_else(|| header.markers.first())
            .ok_or_else(|| ModelError::invalid_animation(format!("'{name}' has no markers")))?;

        let relative = (marker.tm - header.ip).round();
        if !relative.is_finite() || relative < 0.0 || relative >= span {
            return Err(ModelError::invalid_animation(format!(
                "'{name}' marker '{}' at frame {} is outside [0, {})",
                marker.cm, relative, span
            )));
        }

        Ok(Self {
            name,
            document: Arc::new(document),
            impact_marker_frame: relative as u32,
            frame_rate: header.fr,
            total_frames: span as u32,
            intrinsic_width: header.w.round() as u32,
            intrinsic_height: header.h.round() as u32,
        })
    }

    /// Seconds of animation played before the cut.
    pub fn pre_roll(&self) -> f64 {
        self.impact_marker_frame as f64 / self.frame_rate
    }

    /// Total animation length in seconds.
    pub fn duration(&self) -> f64 {
        self.total_frames as f64 / self.frame_rate
    }

    /// Re-check the timing invariants, for descriptors assembled by hand.
    pub fn validate(&self) -> ModelResult<()> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ModelError::invalid_animation(format!(
                "'{}' has invalid frame rate {}",
                self.name, self.frame_rate
            )));
        }
        if self.total_frames == 0 {
            return Err(ModelError::invalid_animation(format!("'{}' has no frames", self.name)));
        }
        if self.impact_marker_frame >= self.total_frames {
            return Err(ModelError::invalid_animation(format!(
                "'{}' impact frame {} is outside [0, {})",
                self.name, self.impact_marker_frame, self.total_frames
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(markers: Value) -> Value {
        json!({
            "v": "5.7.0", "fr": 30, "ip": 0, "op": 30, "w": 1080, "h": 1920,
            "layers": [], "markers": markers
        })
    }

    #[test]
    fn test_descriptor_from_first_marker() {
        let t = TransitionDescriptor::from_document("swipe", doc(json!([{"cm": "hit", "tm": 15, "dr": 0}])))
            .unwrap();
        assert_eq!(t.frame_rate, 30.0);
        assert_eq!(t.total_frames, 30);
        assert_eq!(t.impact_marker_frame, 15);
        assert_eq!(t.pre_roll(), 0.5);
        assert_eq!(t.duration(), 1.0);
        assert_eq!((t.intrinsic_width, t.intrinsic_height), (1080, 1920));
    }

    #[test]
    fn test_named_impact_marker_wins() {
        let markers = json!([{"cm": "intro", "tm": 2}, {"cm": "Impact", "tm": 12}]);
        let t = TransitionDescriptor::from_document("x", doc(markers)).unwrap();
        assert_eq!(t.impact_marker_frame, 12);
    }

    #[test]
    fn test_marker_relative_to_in_point() {
        let mut d = doc(json!([{"cm": "impact", "tm": 25}]));
        d["ip"] = json!(10);
        d["op"] = json!(40);
        let t = TransitionDescriptor::from_document("x", d).unwrap();
        assert_eq!(t.impact_marker_frame, 15);
        assert_eq!(t.total_frames, 30);
    }

    #[test]
    fn test_invalid_animations() {
        assert!(matches!(
            TransitionDescriptor::from_document("x", doc(json!([]))),
            Err(ModelError::InvalidAnimation(_))
        ));
        assert!(matches!(
            TransitionDescriptor::from_document("x", doc(json!([{"cm": "a", "tm": 30}]))),
            Err(ModelError::InvalidAnimation(_))
        ));

        let mut zero = doc(json!([{"cm": "a", "tm": 0}]));
        zero["op"] = json!(0);
        assert!(matches!(
            TransitionDescriptor::from_document("x", zero),
            Err(ModelError::InvalidAnimation(_))
        ));

        let mut bad_fps = doc(json!([{"cm": "a", "tm": 0}]));
        bad_fps["fr"] = json!(0);
        assert!(matches!(
            TransitionDescriptor::from_document("x", bad_fps),
            Err(ModelError::InvalidAnimation(_))
        ));
    }

    #[test]
    fn test_unparseable_document() {
        assert!(matches!(
            TransitionDescriptor::from_slice("broken", b"{not json"),
            Err(ModelError::Decode { .. })
        ));
        assert!(matches!(
            TransitionDescriptor::from_document("nofr", json!({"w": 1, "h": 1})),
            Err(ModelError::Decode { .. })
        ));
    }
}
