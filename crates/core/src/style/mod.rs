use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ShowGenError;

/// Named policy controlling cue density and fade timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Calm,
    Moderate,
    Energetic,
    Dramatic,
}

/// Fixed timing policy attached to every [`Style`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StylePolicy {
    /// Beats between scheduled cue changes.
    pub beat_interval: usize,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
    /// Maximum number of cues grouped into one sequence.
    pub phrase_steps: usize,
    /// Onset density (onsets per second) above which a segment plays at full
    /// intensity.
    pub energy_threshold: f64,
    /// Insert a blackout look at the first cue of each new segment.
    pub blackout_on_segment: bool,
}

impl Style {
    pub const ALL: [Style; 4] = [
        Style::Calm,
        Style::Moderate,
        Style::Energetic,
        Style::Dramatic,
    ];

    pub fn policy(self) -> StylePolicy {
        match self {
            Style::Calm => StylePolicy {
                beat_interval: 4,
                fade_in_ms: 500,
                fade_out_ms: 500,
                phrase_steps: 4,
                energy_threshold: 5.0,
                blackout_on_segment: false,
            },
            Style::Moderate => StylePolicy {
                beat_interval: 2,
                fade_in_ms: 300,
                fade_out_ms: 300,
                phrase_steps: 8,
                energy_threshold: 3.0,
                blackout_on_segment: false,
            },
            Style::Energetic => StylePolicy {
                beat_interval: 1,
                fade_in_ms: 150,
                fade_out_ms: 150,
                phrase_steps: 16,
                energy_threshold: 2.0,
                blackout_on_segment: false,
            },
            Style::Dramatic => StylePolicy {
                beat_interval: 2,
                fade_in_ms: 400,
                fade_out_ms: 400,
                phrase_steps: 8,
                energy_threshold: 2.5,
                blackout_on_segment: true,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Style::Calm => "calm",
            Style::Moderate => "moderate",
            Style::Energetic => "energetic",
            Style::Dramatic => "dramatic",
        }
    }
}

impl Default for Style {
    fn default() -> Self {
        Style::Moderate
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = ShowGenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                ShowGenError::msg(format!(
                    "unknown style `{value}`; expected one of calm, moderate, energetic, dramatic"
                ))
            })
    }
}
