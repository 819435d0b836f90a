//! Core library for the Beatlight show generator.
//!
//! The crate turns a beat analysis and a fixture inventory into a lighting
//! workspace for a DMX control application. Each module owns one pipeline
//! stage and only consumes the finished output of the stage before it:
//! analysis ingest, fixture registry, cue scheduling, look synthesis, function
//! building, timeline assembly and workspace serialization.

pub mod analysis;
pub mod config;
pub mod cues;
pub mod error;
pub mod fixtures;
pub mod functions;
pub mod generator;
pub mod looks;
pub mod style;
pub mod timeline;
pub mod workspace;

pub use analysis::{AnalysisPayload, AudioAnalysis, Segment, SegmentPayload};
pub use config::{load_json, GeneratorConfig};
pub use cues::{Cue, CueScheduler};
pub use error::{Result, ShowGenError};
pub use fixtures::{
    ColorPalette, Fixture, FixtureConfigPayload, FixturePayload, FixtureRegistry, NamedColor, Rgb,
};
pub use functions::{
    CueGroup, Function, FunctionBuilder, FunctionId, FunctionIds, FunctionKind, FunctionSet,
    SequenceStep,
};
pub use generator::ShowGenerator;
pub use looks::{Look, LookSynthesizer, SynthesizedCue};
pub use style::{Style, StylePolicy};
pub use timeline::{AudioReference, Placement, Show, TimelineAssembler};
pub use workspace::{parse_workspace, Creator, PatchedFixture, Workspace};
