use std::{cmp::Ordering, path::Path};

use serde::{Deserialize, Serialize};

use crate::{config, Result, ShowGenError};

/// Timestamps closer than this are treated as the same instant.
pub(crate) const TIME_EPSILON: f64 = 1e-6;
/// A leading boundary later than this gets an implicit segment starting at 0.
const LEADING_GAP_SECONDS: f64 = 0.5;
/// A trailing boundary earlier than `duration - TRAILING_GAP_SECONDS` gets an
/// implicit closing segment ending at the audio end.
const TRAILING_GAP_SECONDS: f64 = 1.0;

/// Raw analysis payload as produced by the external feature extractor.
///
/// Accepts both the `tempo`/`beats`/`segments` contract and the older
/// `bpm`/`beat_times`/`segment_boundaries` layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(alias = "bpm")]
    pub tempo: f64,
    #[serde(alias = "beat_times", default)]
    pub beats: Vec<f64>,
    #[serde(default)]
    pub segments: Vec<SegmentPayload>,
    #[serde(default)]
    pub segment_boundaries: Vec<f64>,
    #[serde(default)]
    pub onset_times: Vec<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub filepath: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentPayload {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub label: String,
}

/// Structural section of the song with its optional onset density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub label: String,
    /// Onsets per second inside the segment, when onset data was supplied.
    pub energy: Option<f64>,
}

/// Validated, immutable view over an audio analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAnalysis {
    tempo: f64,
    beats: Vec<f64>,
    segments: Vec<Segment>,
    end_time: f64,
    source: Option<String>,
}

impl AudioAnalysis {
    /// Reads and validates an analysis payload from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let payload: AnalysisPayload = config::load_json(path)?;
        Self::from_payload(payload)
    }

    /// Validates the payload and normalises it into the engine representation.
    pub fn from_payload(payload: AnalysisPayload) -> Result<Self> {
        let AnalysisPayload {
            tempo,
            beats,
            segments,
            segment_boundaries,
            onset_times,
            duration,
            filepath,
        } = payload;

        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(invalid(format!("tempo must be positive, got {tempo}")));
        }

        validate_beats(&beats)?;

        if let Some(duration) = duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(invalid(format!(
                    "duration must be a non-negative number, got {duration}"
                )));
            }
        }

        let end_time = match (beats.last(), duration) {
            (None, Some(duration)) if duration > 0.0 => {
                return Err(invalid("beats must not be empty for non-empty audio"));
            }
            (None, _) => 0.0,
            (Some(&last), Some(duration)) => {
                if duration + TIME_EPSILON < last {
                    return Err(invalid(format!(
                        "duration {duration}s ends before the last beat at {last}s"
                    )));
                }
                duration.max(last)
            }
            (Some(&last), None) => last + 60.0 / tempo,
        };

        let segments = if segments.is_empty() {
            segments_from_boundaries(segment_boundaries, end_time)?
        } else {
            segments
        };
        validate_segments(&segments)?;

        let onsets: Vec<f64> = onset_times.into_iter().filter(|t| t.is_finite()).collect();
        let resolved = segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| {
                let label = if segment.label.trim().is_empty() {
                    format!("section {}", index + 1)
                } else {
                    segment.label
                };
                let energy = (!onsets.is_empty())
                    .then(|| onset_density(segment.start, segment.end, &onsets));
                Segment {
                    start: segment.start,
                    end: segment.end,
                    label,
                    energy,
                }
            })
            .collect::<Vec<_>>();

        if let Some(first) = beats.first() {
            for segment in &resolved {
                if segment.start > end_time + TIME_EPSILON || segment.end + TIME_EPSILON < *first {
                    tracing::warn!(
                        label = %segment.label,
                        start = segment.start,
                        end = segment.end,
                        "segment lies outside the beat span"
                    );
                }
            }
        }

        tracing::debug!(
            tempo,
            beats = beats.len(),
            segments = resolved.len(),
            end_time,
            "analysis validated"
        );

        Ok(Self {
            tempo,
            beats,
            segments: resolved,
            end_time,
            source: filepath,
        })
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Seconds between two beats at the analysed tempo.
    pub fn beat_period(&self) -> f64 {
        60.0 / self.tempo
    }

    pub fn beats(&self) -> &[f64] {
        &self.beats
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// End of the audio in seconds; zero for an empty analysis.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Audio file path recorded by the analysis step, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Index of the segment active at `time`, if the time is inside one.
    pub fn segment_at(&self, time: f64) -> Option<usize> {
        let index = self
            .segments
            .iter()
            .rposition(|segment| segment.start <= time + TIME_EPSILON)?;
        let segment = &self.segments[index];
        (time <= segment.end + TIME_EPSILON).then_some(index)
    }
}

fn invalid(message: impl Into<String>) -> ShowGenError {
    ShowGenError::InvalidAnalysis(message.into())
}

fn validate_beats(beats: &[f64]) -> Result<()> {
    if let Some(bad) = beats.iter().find(|t| !t.is_finite() || **t < 0.0) {
        return Err(invalid(format!(
            "beat timestamps must be non-negative numbers, got {bad}"
        )));
    }

    if let Some(index) = beats.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(invalid(format!(
            "beats must be strictly increasing: beat {} at {}s follows {}s",
            index + 1,
            beats[index + 1],
            beats[index]
        )));
    }

    Ok(())
}

fn validate_segments(segments: &[SegmentPayload]) -> Result<()> {
    let mut previous_end: Option<f64> = None;

    for (index, segment) in segments.iter().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() || segment.start < 0.0 {
            return Err(invalid(format!(
                "segment {index} has an invalid interval [{}, {}]",
                segment.start, segment.end
            )));
        }
        if segment.end < segment.start {
            return Err(invalid(format!(
                "segment {index} ends at {} before it starts at {}",
                segment.end, segment.start
            )));
        }
        if let Some(end) = previous_end {
            if segment.start + TIME_EPSILON < end {
                return Err(invalid(format!(
                    "segment {index} starts at {} before the previous segment ends at {end}",
                    segment.start
                )));
            }
        }
        previous_end = Some(segment.end);
    }

    Ok(())
}

/// Turns a flat list of boundary times into consecutive unlabelled segments.
fn segments_from_boundaries(mut bounds: Vec<f64>, end_time: f64) -> Result<Vec<SegmentPayload>> {
    if bounds.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(bad) = bounds.iter().find(|t| !t.is_finite() || **t < 0.0) {
        return Err(invalid(format!(
            "segment boundaries must be non-negative numbers, got {bad}"
        )));
    }

    bounds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    bounds.dedup_by(|a, b| (*a - *b).abs() <= TIME_EPSILON);

    if bounds[0] > LEADING_GAP_SECONDS {
        bounds.insert(0, 0.0);
    }
    if let Some(&last) = bounds.last() {
        if last < end_time - TRAILING_GAP_SECONDS {
            bounds.push(end_time);
        }
    }

    Ok(bounds
        .windows(2)
        .map(|pair| SegmentPayload {
            start: pair[0],
            end: pair[1],
            label: String::new(),
        })
        .collect())
}

fn onset_density(start: f64, end: f64, onsets: &[f64]) -> f64 {
    let length = end - start;
    if length <= 0.0 {
        return 0.0;
    }
    let count = onsets.iter().filter(|t| **t >= start && **t < end).count();
    count as f64 / length
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(beats: &[f64]) -> AnalysisPayload {
        AnalysisPayload {
            tempo: 120.0,
            beats: beats.to_vec(),
            ..Default::default()
        }
    }

    fn segment(start: f64, end: f64, label: &str) -> SegmentPayload {
        SegmentPayload {
            start,
            end,
            label: label.to_string(),
        }
    }

    #[test]
    fn accepts_valid_payload() {
        let mut input = payload(&[0.0, 0.5, 1.0, 1.5]);
        input.segments = vec![segment(0.0, 1.0, "intro"), segment(1.0, 2.0, "verse")];
        let analysis = AudioAnalysis::from_payload(input).unwrap();

        assert_eq!(analysis.beats().len(), 4);
        assert_eq!(analysis.segments()[1].label, "verse");
        assert!((analysis.end_time() - 2.0).abs() < 1e-9);
        assert_eq!(analysis.segment_at(1.0), Some(1));
        assert_eq!(analysis.segment_at(0.2), Some(0));
    }

    #[test]
    fn rejects_non_positive_tempo() {
        let mut input = payload(&[0.0, 0.5]);
        input.tempo = 0.0;
        let err = AudioAnalysis::from_payload(input).unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidAnalysis(_)));
    }

    #[test]
    fn rejects_unordered_beats() {
        let err = AudioAnalysis::from_payload(payload(&[0.0, 1.0, 1.0])).unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidAnalysis(_)));

        let err = AudioAnalysis::from_payload(payload(&[0.0, 1.0, 0.5])).unwrap_err();
        assert!(format!("{err}").contains("strictly increasing"));
    }

    #[test]
    fn rejects_empty_beats_for_real_audio() {
        let mut input = payload(&[]);
        input.duration = Some(12.0);
        let err = AudioAnalysis::from_payload(input).unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidAnalysis(_)));
    }

    #[test]
    fn zero_length_audio_passes_ingest() {
        let analysis = AudioAnalysis::from_payload(payload(&[])).unwrap();
        assert!(analysis.beats().is_empty());
        assert_eq!(analysis.end_time(), 0.0);
    }

    #[test]
    fn rejects_inverted_and_overlapping_segments() {
        let mut input = payload(&[0.0, 0.5, 1.0]);
        input.segments = vec![segment(1.0, 0.5, "verse")];
        assert!(AudioAnalysis::from_payload(input).is_err());

        let mut input = payload(&[0.0, 0.5, 1.0]);
        input.segments = vec![segment(0.0, 1.0, "intro"), segment(0.5, 1.5, "verse")];
        let err = AudioAnalysis::from_payload(input).unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidAnalysis(_)));
    }

    #[test]
    fn rejects_duration_shorter_than_beats() {
        let mut input = payload(&[0.0, 0.5, 1.0]);
        input.duration = Some(0.8);
        assert!(AudioAnalysis::from_payload(input).is_err());
    }

    #[test]
    fn parses_legacy_field_names() {
        let json = r#"{
            "filepath": "audio/song1.wav",
            "duration": 10.0,
            "bpm": 120.0,
            "beat_times": [0.0, 0.5, 1.0],
            "onset_times": [0.1, 0.2, 6.0],
            "segment_boundaries": [4.0, 2.0]
        }"#;
        let payload: AnalysisPayload = serde_json::from_str(json).unwrap();
        let analysis = AudioAnalysis::from_payload(payload).unwrap();

        assert_eq!(analysis.tempo(), 120.0);
        assert_eq!(analysis.source(), Some("audio/song1.wav"));
        let starts: Vec<f64> = analysis.segments().iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0]);
        assert_eq!(analysis.segments()[2].end, 10.0);
        assert_eq!(analysis.segments()[0].label, "section 1");
        assert_eq!(analysis.segments()[0].energy, Some(1.0));
        assert_eq!(analysis.segments()[1].energy, Some(0.0));
    }

    #[test]
    fn default_end_time_adds_one_beat() {
        let analysis = AudioAnalysis::from_payload(payload(&[0.0, 0.5, 1.0])).unwrap();
        assert!((analysis.end_time() - 1.5).abs() < 1e-9);
        assert!((analysis.beat_period() - 0.5).abs() < 1e-9);
    }
}
