//! Timeline math: merge points and transition windows.
//!
//! Everything here is pure. Merge points are the cumulative effective
//! durations of the segments; a transition placed on boundary `b` starts
//! `pre_roll` seconds before `merge_points[b]` so that its impact frame lands
//! exactly on the cut.

use serde::Serialize;

use crate::error::{ModelError, ModelResult};
use crate::layer::PlacedTransition;
use crate::segment::MediaSegment;

/// Time span during which one transition overlay is visible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionWindow {
    /// Index of the transition in request order
    pub index: usize,
    /// Boundary (segment cut) the transition is placed on
    pub boundary: usize,
    /// Output time the overlay appears (never negative)
    pub start: f64,
    /// Output time of the impact frame (the cut)
    pub impact: f64,
    /// Output time the overlay disappears
    pub end: f64,
    /// Leading animation seconds clipped because the window would start before zero
    pub skipped_lead: f64,
    pub frame_rate: f64,
    pub total_frames: u32,
}

impl TransitionWindow {
    /// Number of leading animation frames dropped by the clamp.
    pub fn skipped_frames(&self) -> u32 {
        ((self.skipped_lead * self.frame_rate).round() as u32).min(self.total_frames)
    }

    /// Whether `t` falls inside the window.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether this window overlaps another.
    pub fn overlaps(&self, other: &TransitionWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Merge points plus the windows derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub merge_points: Vec<f64>,
    /// Sorted by ascending start
    pub windows: Vec<TransitionWindow>,
}

impl Timeline {
    pub fn build(durations: &[f64], transitions: &[PlacedTransition]) -> ModelResult<Self> {
        let merge_points = compute_merge_points(durations);
        let windows = compute_windows(&merge_points, transitions)?;
        Ok(Self {
            merge_points,
            windows,
        })
    }

    /// Total output duration.
    pub fn total_duration(&self) -> f64 {
        self.merge_points.last().copied().unwrap_or(0.0)
    }

    /// Pairs of windows that overlap in time.
    pub fn overlapping_windows(&self) -> Vec<(&TransitionWindow, &TransitionWindow)> {
        let mut pairs = Vec::new();
        for (i, a) in self.windows.iter().enumerate() {
            for b in &self.windows[i + 1..] {
                if a.overlaps(b) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }

    pub fn preview_frame_at(&self, t: f64) -> Option<PreviewFrame> {
        preview_frame_at(&self.windows, t)
    }
}

/// Running sum of segment durations; the last entry is the total duration.
pub fn compute_merge_points(durations: &[f64]) -> Vec<f64> {
    durations
        .iter()
        .scan(0.0, |acc, d| {
            *acc += d;
            Some(*acc)
        })
        .collect()
}

/// Effective duration of a segment on the timeline.
pub fn effective_duration(segment: &MediaSegment, probed: Option<f64>) -> ModelResult<f64> {
    segment.effective_duration(probed)
}

/// Check that the transitions fit the given number of segments.
///
/// Usable before any durations are known.
pub fn validate_placement(segment_count: usize, transitions: &[PlacedTransition]) -> ModelResult<()> {
    let boundaries = segment_count.saturating_sub(1);
    if transitions.len() > boundaries {
        return Err(ModelError::validation(format!(
            "{} transitions need at least {} segments, got {segment_count}",
            transitions.len(),
            transitions.len() + 1
        )));
    }

    let mut used = vec![false; boundaries];
    for (i, placed) in transitions.iter().enumerate() {
        placed.descriptor.validate()?;
        match used.get_mut(placed.boundary) {
            None => {
                return Err(ModelError::validation(format!(
                    "transition {i} targets boundary {} but only {boundaries} exist",
                    placed.boundary
                )))
            }
            Some(true) => {
                return Err(ModelError::validation(format!(
                    "transition {i} reuses boundary {}",
                    placed.boundary
                )))
            }
            Some(slot) => *slot = true,
        }
    }

    Ok(())
}

/// Windows for every placed transition, sorted by ascending start.
///
/// The sort is stable, so ties keep request order.
pub fn compute_windows(
    merge_points: &[f64],
    transitions: &[PlacedTransition],
) -> ModelResult<Vec<TransitionWindow>> {
    validate_placement(merge_points.len(), transitions)?;

    let mut windows: Vec<TransitionWindow> = transitions
        .iter()
        .enumerate()
        .map(|(index, placed)| {
            let descriptor = &placed.descriptor;
            let impact = merge_points[placed.boundary];
            let raw_start = impact - descriptor.pre_roll();
            let end = raw_start + descriptor.duration();
            let (start, skipped_lead) = if raw_start < 0.0 {
                (0.0, -raw_start)
            } else {
                (raw_start, 0.0)
            };

            TransitionWindow {
                index,
                boundary: placed.boundary,
                start,
                impact,
                end,
                skipped_lead,
                frame_rate: descriptor.frame_rate,
                total_frames: descriptor.total_frames,
            }
        })
        .collect();

    windows.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(windows)
}

/// Which transition frame a preview should show at time `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewFrame {
    pub transition_index: usize,
    pub frame: u32,
}

/// Look up the active transition frame at `t`.
///
/// When windows overlap the one drawn last (latest start) wins, matching the
/// composite order.
pub fn preview_frame_at(windows: &[TransitionWindow], t: f64) -> Option<PreviewFrame> {
    let window = windows.iter().rev().find(|w| w.contains(t))?;
    let elapsed = t - window.start + window.skipped_lead;
    let frame = ((elapsed * window.frame_rate).floor() as u32).min(window.total_frames.saturating_sub(1));
    Some(PreviewFrame {
        transition_index: window.index,
        frame,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TransitionDescriptor;
    use serde_json::json;

    fn transition(marker: u32, frames: u32) -> TransitionDescriptor {
        let doc = json!({
            "fr": 30, "ip": 0, "op": frames, "w": 1080, "h": 1920,
            "markers": [{"cm": "impact", "tm": marker}]
        });
        TransitionDescriptor::from_document("t", doc).unwrap()
    }

    #[test]
    fn test_merge_points_running_sum() {
        assert_eq!(compute_merge_points(&[10.0, 5.5, 2.0]), vec![10.0, 15.5, 17.5]);
        assert!(compute_merge_points(&[]).is_empty());
    }

    #[test]
    fn test_window_aligns_impact_with_cut() {
        let placed = PlacedTransition::sequential(vec![transition(15, 30)]);
        let windows = compute_windows(&[10.0, 20.0], &placed).unwrap();

        assert_eq!(windows.len(), 1);
        let w = windows[0];
        assert_eq!(w.start, 9.5);
        assert_eq!(w.impact, 10.0);
        assert_eq!(w.end, 10.5);
        assert_eq!(w.skipped_lead, 0.0);
    }

    #[test]
    fn test_first_boundary_clamps_to_zero() {
        let placed = PlacedTransition::sequential(vec![transition(15, 30)]);
        let windows = compute_windows(&[0.3, 5.0], &placed).unwrap();

        let w = windows[0];
        assert_eq!(w.start, 0.0);
        assert!((w.skipped_lead - 0.2).abs() < 1e-9);
        assert_eq!(w.skipped_frames(), 6);
        assert!((w.end - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_too_many_transitions_rejected() {
        let placed = PlacedTransition::sequential(vec![transition(15, 30); 3]);
        let result = compute_windows(&[1.0, 2.0, 3.0], &placed);
        assert!(matches!(result, Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_windows_sorted_by_start() {
        let placed = vec![
            PlacedTransition {
                descriptor: transition(15, 30),
                boundary: 1,
            },
            PlacedTransition {
                descriptor: transition(15, 30),
                boundary: 0,
            },
        ];
        let windows = compute_windows(&[4.0, 8.0, 12.0], &placed).unwrap();
        assert_eq!(windows[0].index, 1);
        assert_eq!(windows[1].index, 0);
    }

    #[test]
    fn test_reused_boundary_rejected() {
        let placed = vec![
            PlacedTransition {
                descriptor: transition(15, 30),
                boundary: 0,
            },
            PlacedTransition {
                descriptor: transition(15, 30),
                boundary: 0,
            },
        ];
        assert!(validate_placement(3, &placed).is_err());
    }

    #[test]
    fn test_preview_frame_lookup() {
        let timeline = Timeline::build(&[10.0, 10.0], &PlacedTransition::sequential(vec![transition(15, 30)])).unwrap();

        assert_eq!(timeline.total_duration(), 20.0);
        assert_eq!(timeline.preview_frame_at(5.0), None);
        assert_eq!(
            timeline.preview_frame_at(10.0),
            Some(PreviewFrame {
                transition_index: 0,
                frame: 15
            })
        );
        assert_eq!(timeline.preview_frame_at(10.5), None);
    }

    #[test]
    fn test_overlap_detection() {
        let placed = PlacedTransition::sequential(vec![transition(15, 60), transition(15, 60)]);
        let timeline = Timeline::build(&[1.0, 1.0, 1.0], &placed).unwrap();
        let pairs: Vec<(usize, usize)> = timeline
            .overlapping_windows()
            .into_iter()
            .map(|(a, b)| (a.index, b.index))
            .collect();
        assert_eq!(pairs, vec![(0, 1)]);
    }
}
