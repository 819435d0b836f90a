use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{analysis::TIME_EPSILON, AudioAnalysis, Style, StylePolicy};

/// Point on the beat grid where the lighting state is allowed to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub time: f64,
    pub beat_index: usize,
    /// Index of the enclosing segment, if any.
    pub segment: Option<usize>,
    pub label: Option<String>,
    /// The cue marks the start of its segment.
    pub segment_start: bool,
}

/// Decides when lighting changes by combining the beat grid, the style
/// interval and segment boundaries.
#[derive(Debug, Clone)]
pub struct CueScheduler {
    policy: StylePolicy,
    tolerance_beats: f64,
}

impl CueScheduler {
    pub fn new(style: Style) -> Self {
        Self {
            policy: style.policy(),
            tolerance_beats: 0.5,
        }
    }

    /// Overrides how close (in beats) a segment start must be to a scheduled
    /// cue to reuse it.
    pub fn with_tolerance(mut self, beats: f64) -> Self {
        self.tolerance_beats = beats.max(0.0);
        self
    }

    /// Produces strictly increasing cues bounded by the first and last beat.
    pub fn schedule(&self, analysis: &AudioAnalysis) -> Vec<Cue> {
        let beats = analysis.beats();
        let Some(&last) = beats.last() else {
            return Vec::new();
        };

        let step = self.policy.beat_interval.max(1);
        let mut scheduled: Vec<usize> = (0..beats.len()).step_by(step).collect();
        if beats.len() < step && beats.len() > 1 {
            scheduled.push(beats.len() - 1);
        }

        let tolerance = self.tolerance_beats * analysis.beat_period();
        let mut boundaries: BTreeSet<usize> = scheduled.iter().copied().collect();
        let mut segment_starts: BTreeMap<usize, usize> = BTreeMap::new();

        for (segment_index, segment) in analysis.segments().iter().enumerate() {
            let start = segment.start;
            if start < beats[0] - tolerance || start > last + tolerance {
                continue;
            }

            let coinciding = scheduled
                .iter()
                .copied()
                .filter(|&index| (beats[index] - start).abs() <= tolerance + TIME_EPSILON)
                .min_by(|&a, &b| {
                    (beats[a] - start)
                        .abs()
                        .total_cmp(&(beats[b] - start).abs())
                });

            let index = match coinciding {
                Some(index) => index,
                None => {
                    let index = nearest_beat(beats, start);
                    if boundaries.insert(index) {
                        tracing::debug!(
                            label = %segment.label,
                            time = beats[index],
                            "forced cue at segment boundary"
                        );
                    }
                    index
                }
            };
            segment_starts.entry(index).or_insert(segment_index);
        }

        let cues: Vec<Cue> = boundaries
            .into_iter()
            .map(|beat_index| {
                let time = beats[beat_index];
                let starts = segment_starts.get(&beat_index).copied();
                let segment = starts.or_else(|| analysis.segment_at(time));
                Cue {
                    time,
                    beat_index,
                    segment,
                    label: segment.map(|index| analysis.segments()[index].label.clone()),
                    segment_start: starts.is_some(),
                }
            })
            .collect();

        tracing::debug!(cues = cues.len(), step, "cues scheduled");
        cues
    }
}

fn nearest_beat(beats: &[f64], time: f64) -> usize {
    let after = beats.partition_point(|&beat| beat < time);
    if after == 0 {
        return 0;
    }
    if after == beats.len() {
        return beats.len() - 1;
    }
    if time - beats[after - 1] <= beats[after] - time {
        after - 1
    } else {
        after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisPayload, SegmentPayload};

    const GRID: [f64; 7] = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];

    fn analysis(beats: &[f64], segment_starts: &[f64]) -> AudioAnalysis {
        let end = beats.last().copied().unwrap_or(0.0);
        let mut bounds: Vec<f64> = segment_starts.to_vec();
        bounds.push(end);
        let segments = bounds
            .windows(2)
            .map(|pair| SegmentPayload {
                start: pair[0],
                end: pair[1],
                label: format!("part at {}", pair[0]),
            })
            .collect();
        AudioAnalysis::from_payload(AnalysisPayload {
            tempo: 120.0,
            beats: beats.to_vec(),
            segments,
            ..Default::default()
        })
        .unwrap()
    }

    fn times(cues: &[Cue]) -> Vec<f64> {
        cues.iter().map(|cue| cue.time).collect()
    }

    #[test]
    fn coinciding_segment_start_adds_no_cue() {
        let cues = CueScheduler::new(Style::Moderate).schedule(&analysis(&GRID, &[0.0, 1.0]));
        assert_eq!(times(&cues), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(cues[1].segment_start);
        assert_eq!(cues[1].label.as_deref(), Some("part at 1"));
        assert_eq!(cues[0].segment, Some(0));
        assert_eq!(cues[2].segment, Some(1));
    }

    #[test]
    fn off_grid_segment_start_forces_a_cue() {
        let cues = CueScheduler::new(Style::Moderate).schedule(&analysis(&GRID, &[0.0, 0.5]));
        assert_eq!(times(&cues), vec![0.0, 0.5, 1.0, 2.0, 3.0]);
        assert!(cues[1].segment_start);
        assert!(!cues[2].segment_start);
        assert_eq!(cues[2].segment, Some(1));
    }

    #[test]
    fn near_miss_keeps_the_scheduled_timestamp() {
        let cues = CueScheduler::new(Style::Moderate).schedule(&analysis(&GRID, &[0.0, 1.1]));
        assert_eq!(times(&cues), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(cues[1].segment, Some(1));
    }

    #[test]
    fn style_controls_density() {
        let beats: Vec<f64> = (0..16).map(|i| i as f64 * 0.5).collect();
        let input = analysis(&beats, &[]);
        assert_eq!(CueScheduler::new(Style::Energetic).schedule(&input).len(), 16);
        assert_eq!(CueScheduler::new(Style::Calm).schedule(&input).len(), 4);
        assert_eq!(CueScheduler::new(Style::Moderate).schedule(&input).len(), 8);
    }

    #[test]
    fn short_inputs_keep_first_and_last_beat() {
        let cues = CueScheduler::new(Style::Calm).schedule(&analysis(&[0.0, 0.5, 1.0], &[]));
        assert_eq!(times(&cues), vec![0.0, 1.0]);

        let cues = CueScheduler::new(Style::Calm).schedule(&analysis(&[2.0], &[]));
        assert_eq!(times(&cues), vec![2.0]);
    }

    #[test]
    fn empty_analysis_schedules_nothing() {
        let cues = CueScheduler::new(Style::Energetic).schedule(&analysis(&[], &[]));
        assert!(cues.is_empty());
    }

    #[test]
    fn cues_are_strictly_increasing_and_bounded() {
        let beats: Vec<f64> = (0..40).map(|i| i as f64 * 0.47).collect();
        let input = analysis(&beats, &[0.0, 1.2, 3.3, 7.9, 11.0, 15.0]);
        for style in Style::ALL {
            let cues = CueScheduler::new(style).schedule(&input);
            assert!(cues.windows(2).all(|pair| pair[0].time < pair[1].time));
            let last = *beats.last().unwrap();
            assert!(cues.iter().all(|cue| cue.time >= 0.0 && cue.time <= last));
        }
    }

    #[test]
    fn nearest_beat_prefers_earlier_on_ties() {
        assert_eq!(nearest_beat(&GRID, 0.25), 0);
        assert_eq!(nearest_beat(&GRID, 0.3), 1);
        assert_eq!(nearest_beat(&GRID, 9.0), 6);
    }
}
