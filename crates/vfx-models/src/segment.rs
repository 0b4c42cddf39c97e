//! Media segments: one input clip with an optional trim window.

use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};

/// A validated trim window in source seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    /// Length of the window in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One input video clip.
///
/// The source bytes are shared read-only with the pipeline for the duration
/// of the clip's transcode; the caller keeps ownership of its own copy.
#[derive(Clone)]
pub struct MediaSegment {
    /// Display name used in logs and errors (usually the file name)
    pub name: String,
    /// Encoded source clip
    pub source: Arc<[u8]>,
    /// MIME type of the source (e.g. "video/mp4")
    pub mime_type: String,
    /// Whether `trim_start`/`trim_end` apply
    pub trim_enabled: bool,
    /// Trim start in seconds
    pub trim_start: Option<f64>,
    /// Trim end in seconds
    pub trim_end: Option<f64>,
}

impl MediaSegment {
    /// Create an untrimmed segment.
    pub fn new(name: impl Into<String>, source: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            mime_type: mime_type.into(),
            trim_enabled: false,
            trim_start: None,
            trim_end: None,
        }
    }

    /// Enable trimming to `[start, end)` seconds of the source.
    pub fn with_trim(mut self, start: f64, end: f64) -> Self {
        self.trim_enabled = true;
        self.trim_start = Some(start);
        self.trim_end = Some(end);
        self
    }

    /// The validated trim window, or `None` when trimming is disabled.
    pub fn trim_window(&self) -> ModelResult<Option<TrimWindow>> {
        if !self.trim_enabled {
            return Ok(None);
        }

        let (Some(start), Some(end)) = (self.trim_start, self.trim_end) else {
            return Err(ModelError::validation(format!(
                "segment '{}' has trimming enabled without both trim bounds",
                self.name
            )));
        };

        if !start.is_finite() || !end.is_finite() || start < 0.0 {
            return Err(ModelError::validation(format!(
                "segment '{}' has an invalid trim window [{start}, {end}]",
                self.name
            )));
        }

        if end <= start {
            return Err(ModelError::validation(format!(
                "segment '{}' trim end ({end}) must be after trim start ({start})",
                self.name
            )));
        }

        Ok(Some(TrimWindow { start, end }))
    }

    /// Effective duration on the timeline.
    ///
    /// Trimmed segments use the requested trim length regardless of the
    /// source's native length; untrimmed segments need the probed duration.
    pub fn effective_duration(&self, probed: Option<f64>) -> ModelResult<f64> {
        match self.trim_window()? {
            Some(window) => Ok(window.duration()),
            None => probed.filter(|d| d.is_finite() && *d > 0.0).ok_or_else(|| {
                ModelError::validation(format!(
                    "segment '{}' is untrimmed and has no probed duration",
                    self.name
                ))
            }),
        }
    }

    /// File extension matching the MIME type, used for scratch file names.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.to_lowercase().as_str() {
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            "video/x-matroska" => "mkv",
            "video/x-msvideo" => "avi",
            "video/mpeg" => "mpg",
            _ => "mp4",
        }
    }
}

impl fmt::Debug for MediaSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSegment")
            .field("name", &self.name)
            .field("source_len", &self.source.len())
            .field("mime_type", &self.mime_type)
            .field("trim_enabled", &self.trim_enabled)
            .field("trim_start", &self.trim_start)
            .field("trim_end", &self.trim_end)
            .finish()
    }
}
