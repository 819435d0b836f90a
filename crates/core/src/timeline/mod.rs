use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    functions::seconds_to_ms, AudioAnalysis, FunctionId, FunctionIds, FunctionSet, Result,
    ShowGenError,
};

/// Audio file placed on the show timeline. Never decoded by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioReference {
    pub id: FunctionId,
    pub name: String,
    pub path: String,
    pub start_ms: u32,
    pub duration_ms: u32,
}

/// One function triggered on the lights track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub function: FunctionId,
    pub start_ms: u32,
    pub duration_ms: u32,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

impl Placement {
    pub fn end_ms(&self) -> u32 {
        self.start_ms + self.duration_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: FunctionId,
    pub name: String,
    /// Tempo rounded to whole beats per minute for the time division.
    pub bpm: u32,
    pub audio: AudioReference,
    /// Ordered by start time.
    pub placements: Vec<Placement>,
}

impl Show {
    /// Length of the show: the audio or the last placement, whichever ends later.
    pub fn duration_ms(&self) -> u32 {
        self.placements
            .iter()
            .map(Placement::end_ms)
            .chain(std::iter::once(self.audio.start_ms + self.audio.duration_ms))
            .max()
            .unwrap_or(0)
    }
}

/// Places the audio reference and the built functions on one timeline.
#[derive(Debug, Clone)]
pub struct TimelineAssembler {
    name: String,
}

impl TimelineAssembler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn assemble(
        &self,
        set: &FunctionSet,
        analysis: &AudioAnalysis,
        audio_path: &str,
        mut ids: FunctionIds,
    ) -> Result<Show> {
        let audio_id = ids.allocate();
        let show_id = ids.allocate();

        let audio = AudioReference {
            id: audio_id,
            name: Path::new(audio_path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| audio_path.to_string()),
            path: audio_path.to_string(),
            start_ms: 0,
            duration_ms: seconds_to_ms(analysis.end_time()),
        };

        let placements: Vec<Placement> = set
            .groups
            .iter()
            .map(|group| Placement {
                function: group.function,
                start_ms: group.start_ms,
                duration_ms: group.duration_ms,
                fade_in_ms: group.fade_in_ms,
                fade_out_ms: group.fade_out_ms,
            })
            .collect();

        if let Some(pair) = placements
            .windows(2)
            .find(|pair| pair[1].start_ms < pair[0].start_ms)
        {
            return Err(ShowGenError::msg(format!(
                "placement of function {} at {}ms precedes function {} at {}ms",
                pair[1].function, pair[1].start_ms, pair[0].function, pair[0].start_ms
            )));
        }
        if let Some(late) = placements
            .iter()
            .find(|placement| placement.start_ms > audio.duration_ms)
        {
            return Err(ShowGenError::msg(format!(
                "function {} starts at {}ms after the audio ends at {}ms",
                late.function, late.start_ms, audio.duration_ms
            )));
        }

        let show = Show {
            id: show_id,
            name: self.name.clone(),
            bpm: analysis.tempo().round().max(1.0) as u32,
            audio,
            placements,
        };

        tracing::debug!(
            placements = show.placements.len(),
            duration_ms = show.duration_ms(),
            "timeline assembled"
        );

        Ok(show)
    }
}
