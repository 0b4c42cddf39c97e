//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vfx_models::EncodingProfile;

use crate::error::{RenderError, RenderResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-worker scratch directories
    pub work_dir: PathBuf,
    /// FFmpeg binary; resolved from PATH when unset
    pub ffmpeg_bin: Option<PathBuf>,
    /// Output frame rate
    pub frame_rate: u32,
    /// x264 constant rate factor
    pub crf: u8,
    /// x264 preset
    pub preset: String,
    /// Maximum concurrent normalizations; unlimited when unset
    pub max_parallel: Option<usize>,
    /// Deadline after which a render is cancelled
    pub render_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let profile = EncodingProfile::default();
        Self {
            work_dir: std::env::temp_dir().join("vfx"),
            ffmpeg_bin: None,
            frame_rate: profile.frame_rate,
            crf: profile.crf,
            preset: profile.preset,
            max_parallel: None,
            render_timeout: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("VFX_WORK_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_bin: std::env::var("VFX_FFMPEG_BIN").ok().map(PathBuf::from),
            frame_rate: std::env::var("VFX_FRAME_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frame_rate),
            crf: std::env::var("VFX_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            preset: std::env::var("VFX_PRESET").unwrap_or(defaults.preset),
            max_parallel: std::env::var("VFX_MAX_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0),
            render_timeout: std::env::var("VFX_RENDER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Reject settings FFmpeg would refuse later.
    pub fn validate(&self) -> RenderResult<()> {
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(RenderError::config(format!(
                "frame rate {} is outside 1..=240",
                self.frame_rate
            )));
        }
        if self.crf > 51 {
            return Err(RenderError::config(format!("crf {} is outside 0..=51", self.crf)));
        }
        if self.preset.trim().is_empty() {
            return Err(RenderError::config("encoder preset is empty"));
        }
        if self.max_parallel == Some(0) {
            return Err(RenderError::config("max_parallel must be at least 1"));
        }
        Ok(())
    }

    /// Encoding profile shared by every stage.
    pub fn encoding_profile(&self) -> EncodingProfile {
        EncodingProfile::default()
            .with_frame_rate(self.frame_rate)
            .with_crf(self.crf)
            .with_preset(self.preset.clone())
    }
}
