//! Clip normalization.
//!
//! Every source clip is re-encoded to the same resolution, frame rate, pixel
//! format and stream layout so the clips can be joined with stream copy.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use vfx_models::{effective_duration, EncodingProfile, MediaSegment};

use crate::cancel::CancelSignal;
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::{normalize_video_filter, silent_audio_source};
use crate::log_probe::SourceProbe;
use crate::worker::{TranscodeWorker, WorkerEvent};

/// Scratch name of the normalized output.
pub const NORMALIZED_OUTPUT: &str = "normalized.mp4";

/// Event reported while a clip is normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizeEvent {
    /// Native source duration in seconds, once probed
    NativeDuration(f64),
    /// Monotonic completion fraction in `[0, 1]`
    Progress(f64),
}

/// Receives normalize events.
pub type NormalizeEventHandler = Arc<dyn Fn(NormalizeEvent) + Send + Sync>;

/// A clip re-encoded to the common output format.
#[derive(Clone)]
pub struct NormalizedClip {
    pub encoded_bytes: Vec<u8>,
    /// Duration the clip occupies on the timeline
    pub measured_duration: f64,
    /// What the probe found out about the source
    pub source: SourceProbe,
}

impl std::fmt::Debug for NormalizedClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedClip")
            .field("encoded_len", &self.encoded_bytes.len())
            .field("measured_duration", &self.measured_duration)
            .field("source", &self.source)
            .finish()
    }
}

/// Normalizes clips to a fixed output size and encoding profile.
#[derive(Debug, Clone)]
pub struct ClipNormalizer {
    width: u32,
    height: u32,
    profile: EncodingProfile,
}

impl ClipNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            profile: EncodingProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: EncodingProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Normalize one segment inside `worker`.
    ///
    /// The probe run always finishes before the transcode starts. On
    /// cancellation the running process is killed and `Cancelled` is
    /// returned; partial output is never returned.
    pub async fn normalize(
        &self,
        worker: &mut dyn TranscodeWorker,
        index: usize,
        segment: &MediaSegment,
        cancel: &CancelSignal,
        on_event: NormalizeEventHandler,
    ) -> MediaResult<NormalizedClip> {
        let subject = format!("segment {index} ('{}')", segment.name);
        let trim = segment.trim_window()?;
        let input = format!("input.{}", segment.file_extension());

        worker.write_input(&input, &segment.source).await?;

        let source = self.probe(worker, &input, &subject, cancel).await?;
        let native = source
            .duration
            .ok_or_else(|| MediaError::decode(&subject, "source duration is unknown"))?;
        on_event(NormalizeEvent::NativeDuration(native));

        if let Some(window) = trim {
            if window.end > native + 0.001 {
                warn!(
                    segment = index,
                    trim_end = window.end,
                    native_duration = native,
                    "Trim window extends past the end of the source"
                );
            }
        }

        let expected = effective_duration(segment, Some(native))?;
        let args = self.build_args(&input, trim.map(|w| (w.start, w.duration())), &source, expected);

        let last_out_time = Arc::new(Mutex::new(0.0f64));
        let best_fraction = Arc::new(Mutex::new(0.0f64));
        {
            let last_out_time = last_out_time.clone();
            let best_fraction = best_fraction.clone();
            let on_event = on_event.clone();
            worker.set_event_handler(Some(Arc::new(move |event: WorkerEvent| {
                let WorkerEvent::Progress(progress) = event else {
                    return;
                };
                if let Ok(mut last) = last_out_time.lock() {
                    *last = last.max(progress.out_time_secs());
                }
                // Every tick is reported; a stalled tick repeats the best fraction.
                let fraction = match best_fraction.lock() {
                    Ok(mut best) => {
                        *best = best.max(progress.fraction(expected));
                        *best
                    }
                    Err(_) => return,
                };
                on_event(NormalizeEvent::Progress(fraction));
            })));
        }

        info!(
            segment = index,
            width = self.width,
            height = self.height,
            expected_secs = expected,
            has_audio = source.has_audio,
            "Normalizing clip"
        );

        let status = worker.execute(&args, cancel).await;
        worker.set_event_handler(None);
        status?.check("normalize")?;

        let encoded_bytes = worker.read_output(NORMALIZED_OUTPUT).await?;
        worker.delete_file(NORMALIZED_OUTPUT).await?;
        worker.delete_file(&input).await?;

        let reported = last_out_time.lock().map(|t| *t).unwrap_or(0.0);
        let measured_duration = match trim {
            None if reported > 0.0 => reported,
            _ => expected,
        };

        on_event(NormalizeEvent::Progress(1.0));
        debug!(
            segment = index,
            measured_duration,
            bytes = encoded_bytes.len(),
            "Clip normalized"
        );

        Ok(NormalizedClip {
            encoded_bytes,
            measured_duration,
            source,
        })
    }

    /// Probe-only run; its non-zero exit is expected.
    async fn probe(
        &self,
        worker: &mut dyn TranscodeWorker,
        input: &str,
        subject: &str,
        cancel: &CancelSignal,
    ) -> MediaResult<SourceProbe> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        {
            let lines = lines.clone();
            worker.set_event_handler(Some(Arc::new(move |event: WorkerEvent| {
                if let WorkerEvent::Log(line) = event {
                    if let Ok(mut lines) = lines.lock() {
                        lines.push(line);
                    }
                }
            })));
        }

        let status = worker
            .execute(&FfmpegCommand::probe(input).build_args(), cancel)
            .await;
        worker.set_event_handler(None);
        let status = status?;

        let lines = lines.lock().map(|l| l.clone()).unwrap_or_default();
        let probe = SourceProbe::from_log(&lines);
        debug!(subject, exit_code = ?status.code, ?probe, "Probed source");

        if !probe.has_video {
            return Err(MediaError::decode(subject, "no video stream found"));
        }
        Ok(probe)
    }

    /// Arguments of the normalize pass.
    pub fn build_args(
        &self,
        input: &str,
        trim: Option<(f64, f64)>,
        source: &SourceProbe,
        expected: f64,
    ) -> Vec<String> {
        let mut cmd = FfmpegCommand::new(NORMALIZED_OUTPUT);

        if let Some((start, length)) = trim {
            cmd = cmd.seek(start).duration(length);
        }
        cmd = cmd.input(input);

        let audio_map = if source.has_audio {
            "0:a:0"
        } else {
            cmd = cmd
                .input_args(["-f", "lavfi"])
                .duration(expected)
                .input(silent_audio_source(
                    self.profile.audio_sample_rate,
                    self.profile.audio_channels,
                ));
            "1:a:0"
        };

        cmd = cmd
            .video_filter(normalize_video_filter(
                self.width,
                self.height,
                self.profile.frame_rate,
                &self.profile.pixel_format,
            ))
            .map("0:v:0")
            .map(audio_map)
            .output_args(self.profile.to_ffmpeg_args());

        if !source.has_audio {
            cmd = cmd.output_arg("-shortest");
        }

        cmd.output_args(["-movflags", "+faststart"]).build_args()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::ffmpeg_worker::FfmpegEngine;
    use crate::testing::{FakeEngine, FakeScript};
    use crate::worker::TranscodeEngine;

    fn probe(has_audio: bool) -> SourceProbe {
        SourceProbe {
            duration: Some(10.0),
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            has_video: true,
            has_audio,
        }
    }

    fn collect() -> (NormalizeEventHandler, Arc<Mutex<Vec<NormalizeEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (
            Arc::new(move |e: NormalizeEvent| sink.lock().unwrap().push(e)),
            events,
        )
    }

    #[test]
    fn test_args_trimmed_with_audio() {
        let normalizer = ClipNormalizer::new(1080, 1920);
        let args = normalizer.build_args("input.mp4", Some((2.0, 5.5)), &probe(true), 5.5);
        let joined = args.join(" ");

        assert!(joined.contains("-ss 2.000 -t 5.500 -i input.mp4"));
        assert!(joined.contains("-map 0:v:0 -map 0:a:0"));
        assert!(joined.contains("fps=30,format=yuv420p"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-ar 48000 -ac 2"));
        assert!(!joined.contains("anullsrc"));
        assert_eq!(args.last().unwrap(), NORMALIZED_OUTPUT);
    }

    #[test]
    fn test_args_silent_track_for_mute_clip() {
        let normalizer = ClipNormalizer::new(1080, 1920);
        let args = normalizer.build_args("input.mp4", None, &probe(false), 10.0);
        let joined = args.join(" ");

        assert!(joined.contains("-f lavfi -t 10.000 -i anullsrc=channel_layout=stereo:sample_rate=48000"));
        assert!(joined.contains("-map 1:a:0"));
        assert!(joined.contains("-shortest"));
    }

    #[tokio::test]
    async fn test_normalize_reports_duration_and_progress() {
        let engine = FakeEngine::new(FakeScript::default().with_source_duration(10.0));
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, events) = collect();

        let segment = MediaSegment::new("a.mp4", vec![1u8, 2, 3], "video/mp4");
        let clip = ClipNormalizer::new(1080, 1920)
            .normalize(worker.as_mut(), 0, &segment, &CancelSignal::never(), handler)
            .await
            .unwrap();

        assert_eq!(clip.measured_duration, 10.0);
        assert!(!clip.encoded_bytes.is_empty());

        let events = events.lock().unwrap();
        assert_eq!(events[0], NormalizeEvent::NativeDuration(10.0));
        let fractions: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                NormalizeEvent::Progress(f) => Some(*f),
                _ => None,
            })
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn test_trimmed_clip_uses_trim_length() {
        let engine = FakeEngine::new(FakeScript::default().with_source_duration(60.0));
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, _) = collect();

        let segment = MediaSegment::new("a.mp4", vec![1u8], "video/mp4").with_trim(2.0, 7.5);
        let clip = ClipNormalizer::new(1080, 1920)
            .normalize(worker.as_mut(), 0, &segment, &CancelSignal::never(), handler)
            .await
            .unwrap();

        assert_eq!(clip.measured_duration, 5.5);
    }

    #[tokio::test]
    async fn test_every_tick_reported_even_when_stalled() {
        let engine = FakeEngine::new(FakeScript::default().with_stalled_blocks());
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, events) = collect();

        let segment = MediaSegment::new("a.mp4", vec![1u8], "video/mp4");
        ClipNormalizer::new(1080, 1920)
            .normalize(worker.as_mut(), 0, &segment, &CancelSignal::never(), handler)
            .await
            .unwrap();

        let fractions: Vec<f64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                NormalizeEvent::Progress(f) => Some(*f),
                _ => None,
            })
            .collect();
        // 8 engine ticks, then the final 1.0
        assert_eq!(fractions, vec![0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0]);
    }

    /// Encode a synthetic source clip inside a real FFmpeg worker.
    async fn lavfi_source(engine: &FfmpegEngine, video: &str, secs: f64) -> Vec<u8> {
        let mut worker = engine.spawn("source").await.unwrap();
        let duration = format!("{secs}");
        let args: Vec<String> = [
            "-y", "-v", "error", "-f", "lavfi", "-i", video, "-t", duration.as_str(), "-c:v", "libx264",
            "-pix_fmt", "yuv420p", "source.mp4",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        worker
            .execute(&args, &CancelSignal::never())
            .await
            .unwrap()
            .check("source")
            .unwrap();
        worker.read_output("source.mp4").await.unwrap()
    }

    async fn normalize_bytes(engine: &FfmpegEngine, name: &str, bytes: Vec<u8>) -> NormalizedClip {
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, _) = collect();
        let segment = MediaSegment::new(name, bytes, "video/mp4");
        ClipNormalizer::new(320, 180)
            .normalize(worker.as_mut(), 0, &segment, &CancelSignal::never(), handler)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_normalized_output_is_a_fixed_point() {
        let Ok(binary) = crate::ffmpeg_worker::check_ffmpeg() else {
            eprintln!("skipping: ffmpeg not on PATH");
            return;
        };
        let root = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::with_binary(binary).with_scratch_root(root.path());

        // 4:3 and mute, so the pad branch and the silent track both run
        let source = lavfi_source(&engine, "testsrc=size=640x480:rate=25", 3.0).await;

        let first = normalize_bytes(&engine, "source.mp4", source).await;
        assert_eq!((first.source.width, first.source.height), (640, 480));
        assert!(!first.source.has_audio);

        // each pass probes the previous pass's output
        let second = normalize_bytes(&engine, "first.mp4", first.encoded_bytes.clone()).await;
        assert_eq!((second.source.width, second.source.height), (320, 180));
        assert_eq!(second.source.frame_rate, 30.0);
        assert!(second.source.has_audio);
        assert!((second.measured_duration - first.measured_duration).abs() < 0.1);

        let third = normalize_bytes(&engine, "second.mp4", second.encoded_bytes.clone()).await;
        assert_eq!(
            (third.source.width, third.source.height, third.source.frame_rate, third.source.has_audio),
            (320, 180, 30.0, true)
        );
        let d2 = third.source.duration.unwrap();
        let d1 = second.source.duration.unwrap();
        assert!((d2 - d1).abs() < 0.1, "duration drifted from {d1} to {d2}");
        assert!((third.measured_duration - second.measured_duration).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_anamorphic_source_fits_by_display_aspect() {
        let Ok(binary) = crate::ffmpeg_worker::check_ffmpeg() else {
            eprintln!("skipping: ffmpeg not on PATH");
            return;
        };
        let root = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::with_binary(binary).with_scratch_root(root.path());

        // 320x360 storage with 2:1 pixels displays at 16:9 and needs no bars
        let source = lavfi_source(&engine, "color=c=white:size=320x360:rate=30,setsar=2", 1.0).await;
        let clip = normalize_bytes(&engine, "wide.mp4", source).await;

        let mut worker = engine.spawn("inspect").await.unwrap();
        worker.write_input("clip.mp4", &clip.encoded_bytes).await.unwrap();
        let args: Vec<String> = [
            "-y", "-v", "error", "-i", "clip.mp4", "-vf", "crop=8:8:0:86", "-frames:v", "1", "-f", "rawvideo",
            "-pix_fmt", "gray", "edge.raw",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        worker
            .execute(&args, &CancelSignal::never())
            .await
            .unwrap()
            .check("inspect")
            .unwrap();

        let edge = worker.read_output("edge.raw").await.unwrap();
        assert_eq!(edge.len(), 64);
        let mean = edge.iter().map(|&p| p as u32).sum::<u32>() / edge.len() as u32;
        assert!(mean > 200, "left edge is letterboxed (mean luma {mean})");
    }

    #[tokio::test]
    async fn test_source_without_video_is_decode_error() {
        let engine = FakeEngine::new(FakeScript::default().audio_only());
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, _) = collect();

        let segment = MediaSegment::new("song.mp3", vec![1u8], "audio/mpeg");
        let result = ClipNormalizer::new(1080, 1920)
            .normalize(worker.as_mut(), 3, &segment, &CancelSignal::never(), handler)
            .await;

        match result {
            Err(MediaError::Decode { subject, .. }) => assert!(subject.contains("segment 3")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_returns_cancelled() {
        let engine = FakeEngine::new(FakeScript::default().hang_on_transcode());
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, _) = collect();
        let handle = CancelHandle::new();
        let signal = handle.signal();

        let segment = MediaSegment::new("a.mp4", vec![1u8], "video/mp4");
        let normalizer = ClipNormalizer::new(1080, 1920);
        let task = normalizer.normalize(worker.as_mut(), 0, &segment, &signal, handler);

        let canceller = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(task, canceller);
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_failed_transcode_reports_worker_failure() {
        let engine = FakeEngine::new(FakeScript::default().fail_transcode(1));
        let mut worker = engine.spawn("normalize").await.unwrap();
        let (handler, _) = collect();

        let segment = MediaSegment::new("a.mp4", vec![1u8], "video/mp4");
        let result = ClipNormalizer::new(1080, 1920)
            .normalize(worker.as_mut(), 0, &segment, &CancelSignal::never(), handler)
            .await;

        assert!(matches!(
            result,
            Err(MediaError::WorkerFailed {
                exit_code: Some(1),
                ..
            })
        ));
    }
}
