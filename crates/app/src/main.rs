use std::path::PathBuf;

use beatlight_core::{GeneratorConfig, ShowGenerator, Style, Workspace};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> beatlight_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            analysis,
            fixtures,
            output,
            audio_path,
            style,
            name,
        } => run_generate(
            &analysis,
            &fixtures,
            &output,
            &audio_path,
            style,
            name,
        ),
        Commands::Inspect { workspace } => run_inspect(&workspace),
    };

    if let Err(err) = &result {
        tracing::error!(kind = err.kind(), "{err}");
    }
    result
}

fn run_generate(
    analysis: &PathBuf,
    fixtures: &PathBuf,
    output: &PathBuf,
    audio_path: &str,
    style: Style,
    name: Option<String>,
) -> beatlight_core::Result<()> {
    tracing::info!(?analysis, ?fixtures, ?output, %style, "generating show");

    let mut config = GeneratorConfig::with_style(style);
    if let Some(name) = name {
        config.show_name = name;
    }

    let workspace =
        ShowGenerator::new(config).generate_to_file(analysis, fixtures, Some(audio_path), output)?;

    println!("Generated: {}", output.display());
    print_summary(&workspace);
    Ok(())
}

fn run_inspect(path: &PathBuf) -> beatlight_core::Result<()> {
    tracing::info!(?path, "inspecting workspace");
    let workspace = Workspace::load(path)?;
    print_summary(&workspace);
    Ok(())
}

fn print_summary(workspace: &Workspace) {
    let show = &workspace.show;
    println!("  Fixtures:   {}", workspace.fixtures.len());
    println!("  Functions:  {}", workspace.functions.len());
    println!("  Placements: {}", show.placements.len());
    println!("  BPM:        {}", show.bpm);
    println!("  Audio:      {}", show.audio.path);
    println!("  Duration:   {:.1}s", show.duration_ms() as f64 / 1000.0);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-synced DMX light show generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a lighting workspace from a beat analysis and a fixture config.
    Generate {
        /// Beat analysis JSON (tempo, beats, segments).
        #[arg(long)]
        analysis: PathBuf,
        /// Fixture configuration JSON (fixtures and color palette).
        #[arg(long)]
        fixtures: PathBuf,
        /// Output workspace file.
        #[arg(long)]
        output: PathBuf,
        /// Audio file referenced by the show.
        #[arg(long)]
        audio_path: String,
        /// Show style: calm, moderate, energetic or dramatic.
        #[arg(long)]
        style: Style,
        /// Name of the generated show.
        #[arg(long)]
        name: Option<String>,
    },
    /// Print a summary of an existing workspace file.
    Inspect {
        /// Workspace file to read.
        workspace: PathBuf,
    },
}
