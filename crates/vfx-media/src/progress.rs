//! FFmpeg progress parsing.
//!
//! FFmpeg writes `key=value` lines to the `-progress` pipe; a block ends with
//! `progress=continue` or `progress=end`.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Output time in seconds.
    pub fn out_time_secs(&self) -> f64 {
        self.out_time_us.max(0) as f64 / 1_000_000.0
    }

    /// Fraction of `expected_secs` written so far, in `[0, 1]`.
    pub fn fraction(&self, expected_secs: f64) -> f64 {
        if self.is_complete {
            return 1.0;
        }
        if expected_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs() / expected_secs).clamp(0.0, 1.0)
    }
}

/// Classification of one stderr line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// A field of an unfinished progress block
    Field,
    /// The line closed a progress block
    Block(FfmpegProgress),
    /// Not part of the progress protocol (ordinary log output)
    Log,
}

const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Accumulates `-progress` fields into blocks.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stderr line.
    pub fn parse_line(&mut self, line: &str) -> ProgressLine {
        let line = line.trim();

        let Some((key, value)) = line.split_once('=') else {
            return ProgressLine::Log;
        };

        if !PROGRESS_KEYS.contains(&key) && !key.starts_with("stream_") {
            return ProgressLine::Log;
        }

        match key {
            // Both keys carry microseconds despite the name
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_us = us;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.current.is_complete = true;
                }
                return ProgressLine::Block(self.current.clone());
            }
            _ => {}
        }

        ProgressLine::Field
    }
}
