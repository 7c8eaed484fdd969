//! polyvox CLI - offline rendering and preset tools for the polyvox voice engine.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyvox")]
#[command(author, version, about = "polyvox voice engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render notes through a preset to a WAV file
    Render(commands::render::RenderArgs),

    /// Print an envelope as CSV
    Envelope(commands::envelope::EnvelopeArgs),

    /// List, show and export presets
    Presets(commands::presets::PresetsArgs),

    /// Show engine limits and voice types
    Info,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Envelope(args) => commands::envelope::run(args),
        Commands::Presets(args) => commands::presets::run(args),
        Commands::Info => commands::info::run(),
    }
}
