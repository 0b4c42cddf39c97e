//! Source information recovered from FFmpeg's input summary.
//!
//! A probe-only run (`ffmpeg -hide_banner -i input`) prints lines such as
//!
//! ```text
//!   Duration: 00:00:10.00, start: 0.000000, bitrate: 1205 kb/s
//!     Stream #0:0(und): Video: h264 (High), yuv420p(progressive), 1920x1080 [SAR 1:1 DAR 16:9], 30 fps, 30 tbr
//!     Stream #0:1(und): Audio: aac (LC), 48000 Hz, stereo, fltp, 128 kb/s
//! ```
//!
//! and exits non-zero because no output was requested.

use serde::{Deserialize, Serialize};

/// Frame rate assumed when the summary does not state one.
pub const DEFAULT_SOURCE_FPS: f64 = 30.0;

/// What the probe run found out about a source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProbe {
    /// Container duration in seconds
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    /// Frame rate of the first video stream
    pub frame_rate: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

impl Default for SourceProbe {
    fn default() -> Self {
        Self {
            duration: None,
            width: 0,
            height: 0,
            frame_rate: DEFAULT_SOURCE_FPS,
            has_video: false,
            has_audio: false,
        }
    }
}

impl SourceProbe {
    /// Parse the summary lines of a probe-only run.
    pub fn from_log<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut probe = SourceProbe::default();

        for line in lines {
            let line = line.as_ref().trim();

            if let Some(rest) = line.strip_prefix("Duration:") {
                if probe.duration.is_none() {
                    probe.duration = rest.split(',').next().and_then(|d| parse_timestamp(d.trim()));
                }
            } else if line.starts_with("Stream #") {
                if let Some(video) = stream_description(line, "Video:") {
                    if !probe.has_video {
                        probe.has_video = true;
                        apply_video_stream(&mut probe, video);
                    }
                } else if stream_description(line, "Audio:").is_some() {
                    probe.has_audio = true;
                }
            }
        }

        probe
    }
}

fn stream_description<'a>(line: &'a str, kind: &str) -> Option<&'a str> {
    line.split_once(kind).map(|(_, rest)| rest)
}

fn apply_video_stream(probe: &mut SourceProbe, description: &str) {
    let mut tbr = None;

    // Parenthesized groups can contain commas, e.g. "yuv420p(tv, bt709)"
    for part in split_top_level(description) {
        let part = part.trim();

        if probe.width == 0 {
            if let Some((w, h)) = parse_size(part) {
                probe.width = w;
                probe.height = h;
                continue;
            }
        }

        if let Some(fps) = part.strip_suffix(" fps").and_then(parse_rate) {
            probe.frame_rate = fps;
        } else if let Some(rate) = part.strip_suffix(" tbr").and_then(parse_rate) {
            tbr = Some(rate);
        }
    }

    if probe.frame_rate == DEFAULT_SOURCE_FPS {
        if let Some(rate) = tbr {
            probe.frame_rate = rate;
        }
    }
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// "1920x1080 [SAR 1:1 DAR 16:9]" -> (1920, 1080)
fn parse_size(part: &str) -> Option<(u32, u32)> {
    let token = part.split_whitespace().next()?;
    let (w, h) = token.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// "29.97", "30", "25k" style rates.
fn parse_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let parsed = match value.strip_suffix('k') {
        Some(thousands) => thousands.parse::<f64>().ok()? * 1000.0,
        None => value.parse::<f64>().ok()?,
    };
    (parsed.is_finite() && parsed > 0.0).then_some(parsed)
}

/// "HH:MM:SS.ss" -> seconds. "N/A" yields `None`.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
