//! FFmpeg filter definitions.

use vfx_models::{scale_pad_filter, TransitionWindow};

/// Label of the letterboxed base video in the composite graph.
pub const BASE_LABEL: &str = "base";

/// Video chain for a normalized clip: fit and pad to the target, constant
/// frame rate, 4:2:0 chroma.
pub fn normalize_video_filter(width: u32, height: u32, frame_rate: u32, pixel_format: &str) -> String {
    format!(
        "{},fps={},format={}",
        scale_pad_filter(width, height),
        frame_rate,
        pixel_format
    )
}

/// Silent stereo source used for clips without an audio stream.
pub fn silent_audio_source(sample_rate: u32, channels: u32) -> String {
    let layout = if channels == 1 { "mono" } else { "stereo" };
    format!("anullsrc=channel_layout={layout}:sample_rate={sample_rate}")
}

/// Overlay step enabled only during `[start, end]`.
pub fn filter_timed_overlay(start: f64, end: f64) -> String {
    format!("overlay=0:0:eof_action=pass:enable='between(t\\,{start:.3}\\,{end:.3})'")
}

/// Build the composite graph.
///
/// Input `0` is the base video; overlay `k` (in `windows` order, which must
/// already be sorted by start) is input `k + 1`. Returns the graph and the
/// label of its final video output.
pub fn build_composite_graph(windows: &[TransitionWindow], width: u32, height: u32) -> (String, String) {
    let mut graph = format!("[0:v]{}[{BASE_LABEL}]", scale_pad_filter(width, height));
    let mut previous = BASE_LABEL.to_string();

    for (k, window) in windows.iter().enumerate() {
        let label = format!("v{k}");
        graph.push_str(&format!(
            ";[{previous}][{}:v]{}[{label}]",
            k + 1,
            filter_timed_overlay(window.start, window.end)
        ));
        previous = label;
    }

    (graph, previous)
}

/// Contents of a concat demuxer list file.
pub fn concat_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("file '{}'\n", name.as_ref().replace('\'', "'\\''")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(index: usize, start: f64, end: f64) -> TransitionWindow {
        TransitionWindow {
            index,
            boundary: index,
            start,
            impact: start,
            end,
            skipped_lead: 0.0,
            frame_rate: 30.0,
            total_frames: 30,
        }
    }

    #[test]
    fn test_normalize_filter() {
        let filter = normalize_video_filter(1080, 1920, 30, "yuv420p");
        assert!(filter.contains("pad=1080:1920"));
        assert!(filter.ends_with("setsar=1,fps=30,format=yuv420p"));
    }

    #[test]
    fn test_composite_graph_chains_overlays() {
        let (graph, last) = build_composite_graph(&[window(0, 9.5, 10.5), window(1, 19.0, 20.0)], 1080, 1920);

        assert!(graph.starts_with("[0:v]scale="));
        assert!(graph.contains("[base];[base][1:v]overlay=0:0:eof_action=pass:enable='between(t\\,9.500\\,10.500)'[v0]"));
        assert!(graph.contains(";[v0][2:v]overlay="));
        assert_eq!(last, "v1");
    }

    #[test]
    fn test_composite_graph_without_overlays() {
        let (graph, last) = build_composite_graph(&[], 1920, 1080);
        assert!(graph.ends_with("[base]"));
        assert_eq!(last, BASE_LABEL);
    }

    #[test]
    fn test_concat_list() {
        let list = concat_list(&["clip_000.mp4", "clip_001.mp4"]);
        assert_eq!(list, "file 'clip_000.mp4'\nfile 'clip_001.mp4'\n");
        assert_eq!(concat_list(&["it's.mp4"]), "file 'it'\\''s.mp4'\n");
    }
}
