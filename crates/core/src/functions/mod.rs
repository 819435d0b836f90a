use serde::{Deserialize, Serialize};

use crate::{
    AudioAnalysis, FixtureRegistry, Look, Result, ShowGenError, Style, StylePolicy,
    SynthesizedCue,
};

pub type FunctionId = u32;

/// Monotonic function id allocator.
///
/// Passed by value through the pipeline stages that allocate ids and handed
/// back with their output, so ids are never reused within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionIds {
    next: FunctionId,
}

impl FunctionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> FunctionId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Id the next allocation will return.
    pub fn peek(&self) -> FunctionId {
        self.next
    }
}

/// Identified lighting primitive. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    /// One look, held.
    Scene {
        look: Look,
        fade_in_ms: u32,
        fade_out_ms: u32,
    },
    /// Ordered looks. `bound_scene` covers every channel the steps touch.
    Sequence {
        bound_scene: FunctionId,
        steps: Vec<SequenceStep>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub look: Look,
    /// Fade in plus hold.
    pub duration_ms: u32,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

impl Function {
    /// Function ids this function depends on.
    pub fn references(&self) -> Option<FunctionId> {
        match &self.kind {
            FunctionKind::Scene { .. } => None,
            FunctionKind::Sequence { bound_scene, .. } => Some(*bound_scene),
        }
    }
}

/// Run of cues materialised into one function, with its timeline slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueGroup {
    pub function: FunctionId,
    pub start_ms: u32,
    pub duration_ms: u32,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

/// Output of the function builder.
#[derive(Debug, Clone)]
pub struct FunctionSet {
    /// Static all-zero scene, bound by every sequence.
    pub blackout: FunctionId,
    pub functions: Vec<Function>,
    /// Groups in scheduler order.
    pub groups: Vec<CueGroup>,
    pub ids: FunctionIds,
}

/// Groups synthesized cues into scenes and sequences.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    policy: StylePolicy,
}

impl FunctionBuilder {
    pub fn new(style: Style) -> Self {
        Self {
            policy: style.policy(),
        }
    }

    pub fn build(
        &self,
        cues: Vec<SynthesizedCue>,
        registry: &FixtureRegistry,
        analysis: &AudioAnalysis,
        mut ids: FunctionIds,
    ) -> Result<FunctionSet> {
        if cues.is_empty() {
            return Err(ShowGenError::EmptyCueSet);
        }

        let mut functions = Vec::new();
        let blackout = ids.allocate();
        functions.push(Function {
            id: blackout,
            name: "Blackout".to_string(),
            kind: FunctionKind::Scene {
                look: Look::blackout(registry.fixtures()),
                fade_in_ms: 0,
                fade_out_ms: 0,
            },
        });

        let end_ms = seconds_to_ms(analysis.end_time());
        let beat_ms = seconds_to_ms(analysis.beat_period()).max(1);
        let starts: Vec<u32> = cues.iter().map(|c| seconds_to_ms(c.cue.time)).collect();

        let mut groups = Vec::new();
        let mut pending: Vec<(SynthesizedCue, u32)> = Vec::new();

        for (index, synthesized) in cues.into_iter().enumerate() {
            let start = starts[index];
            let end = starts.get(index + 1).copied().unwrap_or(end_ms);
            let duration = if end > start { end - start } else { beat_ms };

            let splits = pending.last().is_some_and(|(previous, _)| {
                synthesized.cue.segment_start || previous.cue.segment != synthesized.cue.segment
            }) || pending.len() >= self.policy.phrase_steps.max(1);

            if splits {
                let run = std::mem::take(&mut pending);
                groups.push(self.emit(run, blackout, &mut ids, &mut functions, groups.len()));
            }
            pending.push((synthesized, duration));
        }
        if !pending.is_empty() {
            groups.push(self.emit(pending, blackout, &mut ids, &mut functions, groups.len()));
        }

        tracing::debug!(
            functions = functions.len(),
            groups = groups.len(),
            "functions built"
        );

        Ok(FunctionSet {
            blackout,
            functions,
            groups,
            ids,
        })
    }

    fn emit(
        &self,
        run: Vec<(SynthesizedCue, u32)>,
        blackout: FunctionId,
        ids: &mut FunctionIds,
        functions: &mut Vec<Function>,
        ordinal: usize,
    ) -> CueGroup {
        let id = ids.allocate();
        let start_ms = seconds_to_ms(run[0].0.cue.time);
        let duration_ms = run.iter().map(|(_, duration)| duration).sum();
        let base = run[0].0.cue.label.clone().unwrap_or_else(|| "phrase".to_string());
        let name = format!("{base} {:03}", ordinal + 1);

        let mut steps: Vec<SequenceStep> = run
            .into_iter()
            .map(|(synthesized, duration)| SequenceStep {
                look: synthesized.look,
                duration_ms: duration,
                fade_in_ms: self.policy.fade_in_ms.min(duration),
                fade_out_ms: self.policy.fade_out_ms.min(duration),
            })
            .collect();

        let fade_in_ms = steps[0].fade_in_ms;
        let fade_out_ms = steps[steps.len() - 1].fade_out_ms;

        let kind = if steps.len() == 1 {
            let step = steps.remove(0);
            FunctionKind::Scene {
                look: step.look,
                fade_in_ms: step.fade_in_ms,
                fade_out_ms: step.fade_out_ms,
            }
        } else {
            FunctionKind::Sequence {
                bound_scene: blackout,
                steps,
            }
        };

        functions.push(Function { id, name, kind });

        CueGroup {
            function: id,
            start_ms,
            duration_ms,
            fade_in_ms,
            fade_out_ms,
        }
    }
}

/// Seconds to whole milliseconds, rounded to nearest.
pub fn seconds_to_ms(seconds: f64) -> u32 {
    (seconds * 1000.0).round().max(0.0) as u32
}
