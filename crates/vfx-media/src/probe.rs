//! FFprobe inspection of rendered files.
//!
//! Render inputs are probed inside their worker from the transcoder's own
//! log (see [`crate::log_probe`]); this module reports on finished outputs.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Stream summary of a rendered file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedInfo {
    /// Container duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub video_codec: String,
    /// Audio codec, if the file has an audio stream
    pub audio_codec: Option<String>,
    /// File size in bytes
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a rendered file with `ffprobe`.
pub async fn probe_rendered(path: impl AsRef<Path>) -> MediaResult<RenderedInfo> {
    let path = path.as_ref();
    let binary = which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new(binary)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::decode(
            path.display().to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    parse_ffprobe_json(&output.stdout, &path.display().to_string())
}

/// Turn `ffprobe -print_format json` output into a summary.
pub fn parse_ffprobe_json(json: &[u8], subject: &str) -> MediaResult<RenderedInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::decode(subject, "no video stream found"))?;
    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    let parse = |v: &Option<String>| v.as_ref().and_then(|s| s.parse::<f64>().ok());

    Ok(RenderedInfo {
        duration: parse(&probe.format.duration).unwrap_or(0.0),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        frame_rate: video
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(0.0),
        video_codec: video.codec_name.clone().unwrap_or_default(),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        size: parse(&probe.format.size).unwrap_or(0.0) as u64,
    })
}

/// Parse a frame rate such as `30/1` or `29.97`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0).then(|| num / den);
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1080, "height": 1920,
                 "r_frame_rate": "30/1", "avg_frame_rate": "30/1"},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"duration": "20.016000", "size": "123456"}
        }"#;

        let info = parse_ffprobe_json(json, "out.mp4").unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
        assert!((info.duration - 20.016).abs() < 1e-9);
        assert_eq!(info.frame_rate, 30.0);
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert_eq!(info.size, 123456);
    }

    #[test]
    fn test_audio_only_file_is_decode_error() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(
            parse_ffprobe_json(json, "song.m4a"),
            Err(MediaError::Decode { .. })
        ));
    }
}
