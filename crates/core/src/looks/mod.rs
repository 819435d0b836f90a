use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AudioAnalysis, Cue, Fixture, FixtureRegistry, Rgb, Style, StylePolicy};

/// Channels that scale the whole fixture output.
const INTENSITY_CHANNELS: [&str; 3] = ["intensity", "dimmer", "master"];
const FULL: u8 = 255;
const MEDIUM: u8 = 191;
const LOW: u8 = 127;
/// Fraction of the style energy threshold that still counts as medium energy.
const MEDIUM_ENERGY_RATIO: f64 = 0.6;

/// Fully resolved channel values per fixture id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Look {
    channels: BTreeMap<u32, Vec<u8>>,
}

impl Look {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every declared channel of every fixture at zero.
    pub fn blackout(fixtures: &[Fixture]) -> Self {
        let mut look = Self::new();
        for fixture in fixtures {
            look.insert(fixture.id, vec![0; fixture.channel_count as usize]);
        }
        look
    }

    pub fn insert(&mut self, fixture: u32, values: Vec<u8>) {
        self.channels.insert(fixture, values);
    }

    pub fn values(&self, fixture: u32) -> Option<&[u8]> {
        self.channels.get(&fixture).map(Vec::as_slice)
    }

    /// Fixture ids with their channel vectors, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.channels
            .iter()
            .map(|(fixture, values)| (*fixture, values.as_slice()))
    }

    pub fn is_blackout(&self) -> bool {
        self.channels.values().flatten().all(|value| *value == 0)
    }
}

/// A scheduled cue together with the look it switches to.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedCue {
    pub cue: Cue,
    pub look: Look,
    /// Palette color the look was resolved from; `None` for blackouts.
    pub color: Option<String>,
}

/// Decides what each cue looks like.
#[derive(Debug)]
pub struct LookSynthesizer<'a> {
    registry: &'a FixtureRegistry,
    policy: StylePolicy,
}

impl<'a> LookSynthesizer<'a> {
    pub fn new(registry: &'a FixtureRegistry, style: Style) -> Self {
        Self {
            registry,
            policy: style.policy(),
        }
    }

    pub fn synthesize(&self, cues: Vec<Cue>, analysis: &AudioAnalysis) -> Vec<SynthesizedCue> {
        let rotation = self.registry.rotation();
        let fixtures = self.registry.fixtures();

        let looks: Vec<SynthesizedCue> = cues
            .into_iter()
            .enumerate()
            .map(|(index, cue)| {
                let later_segment = cue.segment.is_some_and(|segment| segment > 0);
                if self.policy.blackout_on_segment && cue.segment_start && later_segment {
                    return SynthesizedCue {
                        look: Look::blackout(fixtures),
                        color: None,
                        cue,
                    };
                }

                let color = &rotation[index % rotation.len()];
                let energy = cue
                    .segment
                    .and_then(|segment| analysis.segments().get(segment))
                    .and_then(|segment| segment.energy);
                let intensity = self.intensity_for(energy);

                let mut look = Look::new();
                for fixture in fixtures {
                    look.insert(fixture.id, resolve_channels(fixture, color.rgb, intensity));
                }

                SynthesizedCue {
                    look,
                    color: Some(color.name.clone()),
                    cue,
                }
            })
            .collect();

        tracing::debug!(looks = looks.len(), "looks synthesized");
        looks
    }

    fn intensity_for(&self, energy: Option<f64>) -> u8 {
        let threshold = self.policy.energy_threshold;
        match energy {
            None => FULL,
            Some(energy) if energy > threshold => FULL,
            Some(energy) if energy > threshold * MEDIUM_ENERGY_RATIO => MEDIUM,
            Some(_) => LOW,
        }
    }
}

/// Resolves a color and intensity into a channel vector covering every
/// declared channel. Unmapped channels stay at zero.
pub fn resolve_channels(fixture: &Fixture, rgb: Rgb, intensity: u8) -> Vec<u8> {
    let mut values = vec![0u8; fixture.channel_count as usize];
    let dimmer = INTENSITY_CHANNELS
        .iter()
        .find_map(|name| fixture.channel(name));

    let scale = |component: u8| match dimmer {
        Some(_) => component,
        None => ((component as u32 * intensity as u32) / FULL as u32) as u8,
    };

    let mut set = |name: &str, value: u8| {
        if let Some(offset) = fixture.channel(name) {
            values[offset as usize] = value;
        }
    };
    set("red", scale(rgb.r));
    set("green", scale(rgb.g));
    set("blue", scale(rgb.b));

    if let Some(offset) = dimmer {
        values[offset as usize] = intensity;
    }

    values
}
