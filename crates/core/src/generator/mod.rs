use std::path::Path;

use crate::{
    AudioAnalysis, CueScheduler, FixtureRegistry, FunctionBuilder, FunctionIds, GeneratorConfig,
    LookSynthesizer, Result, ShowGenError, TimelineAssembler, Workspace,
};

/// Runs the whole pipeline: schedule cues, synthesize looks, build functions,
/// assemble the timeline and wrap everything into a [`Workspace`].
#[derive(Debug, Clone, Default)]
pub struct ShowGenerator {
    config: GeneratorConfig,
}

impl ShowGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the workspace in memory. Identical inputs give identical output.
    pub fn generate(
        &self,
        analysis: &AudioAnalysis,
        registry: &FixtureRegistry,
        audio_path: &str,
    ) -> Result<Workspace> {
        let style = self.config.style;

        let cues = CueScheduler::new(style)
            .with_tolerance(self.config.boundary_tolerance_beats)
            .schedule(analysis);
        let looks = LookSynthesizer::new(registry, style).synthesize(cues, analysis);
        let set = FunctionBuilder::new(style).build(looks, registry, analysis, FunctionIds::new())?;
        let show = TimelineAssembler::new(self.config.show_name.clone()).assemble(
            &set,
            analysis,
            audio_path,
            set.ids,
        )?;

        let workspace = Workspace::assemble(registry, set, show, self.config.author.clone());

        tracing::info!(
            %style,
            fixtures = workspace.fixtures.len(),
            functions = workspace.functions.len(),
            placements = workspace.show.placements.len(),
            bpm = workspace.show.bpm,
            "show generated"
        );

        Ok(workspace)
    }

    /// Loads both payloads, generates the show and writes it to `output`.
    ///
    /// `audio_path` falls back to the path recorded in the analysis. Nothing is
    /// written unless every stage succeeds.
    pub fn generate_to_file(
        &self,
        analysis_path: impl AsRef<Path>,
        fixtures_path: impl AsRef<Path>,
        audio_path: Option<&str>,
        output: impl AsRef<Path>,
    ) -> Result<Workspace> {
        let analysis = AudioAnalysis::load(analysis_path)?;
        let registry = FixtureRegistry::load(fixtures_path, &self.config.blackout_color)?;

        let audio_path = audio_path
            .or_else(|| analysis.source())
            .map(str::to_owned)
            .ok_or_else(|| {
                ShowGenError::msg("no audio path given and the analysis does not record one")
            })?;

        let workspace = self.generate(&analysis, &registry, &audio_path)?;
        workspace.write_to(output)?;
        Ok(workspace)
    }
}
