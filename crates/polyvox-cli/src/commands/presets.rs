//! Preset management commands.
//!
//! Lists factory and user presets, prints a preset as TOML, and exports
//! presets to files for editing.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Subcommand};
use polyvox_config::{
    VoicePreset, factory_presets, list_user_presets, preset_name_from_path, system_presets_dir,
    user_presets_dir,
};

use super::common::load_preset;

#[derive(Args)]
pub struct PresetsArgs {
    #[command(subcommand)]
    command: PresetsCommand,
}

#[derive(Subcommand)]
enum PresetsCommand {
    /// List available presets (factory and user)
    List {
        /// Show only factory presets
        #[arg(long, conflicts_with = "user")]
        factory: bool,

        /// Show only user presets
        #[arg(long)]
        user: bool,
    },

    /// Print a preset as TOML
    Show {
        /// Preset name or path
        name: String,
    },

    /// Write a preset to a TOML file
    Export {
        /// Preset name or path
        name: String,

        /// Destination file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show preset directories
    Paths,
}

pub fn run(args: PresetsArgs) -> anyhow::Result<()> {
    match args.command {
        PresetsCommand::List { factory, user } => list_presets(factory, user),
        PresetsCommand::Show { name } => show_preset(&name),
        PresetsCommand::Export { name, path, force } => export_preset(&name, &path, force),
        PresetsCommand::Paths => show_paths(),
    }
}

fn list_presets(factory_only: bool, user_only: bool) -> anyhow::Result<()> {
    if !user_only {
        println!("Factory Presets:");
        println!("================");
        for preset in factory_presets() {
            println!("  {}", summary_line(&preset.name, &preset));
        }
        println!();
    }

    if !factory_only {
        println!("User Presets:");
        println!("=============");
        let user_presets = list_user_presets();
        if user_presets.is_empty() {
            println!("  (none)");
            println!();
            println!("  Export a preset to start from: polyvox presets export <name> <path>");
        }
        for path in user_presets {
            let name = preset_name_from_path(&path).unwrap_or_else(|| "unknown".to_string());
            match VoicePreset::load(&path) {
                Ok(preset) => println!("  {}", summary_line(&name, &preset)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable preset");
                    println!("  {name:20} - (error loading)");
                }
            }
        }
        println!();
    }

    Ok(())
}

fn summary_line(name: &str, preset: &VoicePreset) -> String {
    let desc = preset.description.as_deref().unwrap_or("");
    format!("{name:20} {:11} - {desc}", format!("[{}]", preset.voice.kind()))
}

fn show_preset(name: &str) -> anyhow::Result<()> {
    let preset = load_preset(name)?;

    println!("# {} ({} voice)", preset.name, preset.voice.kind());
    if let Err(e) = preset.validate() {
        println!("# warning: {e}");
    }
    print!("{}", preset.to_toml()?);
    Ok(())
}

fn export_preset(name: &str, path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite.", path.display());
    }

    let preset = load_preset(name)?;
    preset
        .save(path)
        .with_context(|| format!("Failed to export preset '{name}'"))?;
    println!("Exported '{}' to {}", preset.name, path.display());
    Ok(())
}

fn show_paths() -> anyhow::Result<()> {
    println!("Preset Directories:");
    println!("===================");
    println!();
    println!("User presets:   {}", user_presets_dir().display());
    println!("System presets: {}", system_presets_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_summary_line_includes_kind() {
        let preset = polyvox_config::get_factory_preset("pluck").unwrap();
        let line = summary_line("pluck", &preset);
        assert!(line.starts_with("pluck"));
        assert!(line.contains("[karplus]"));
        assert!(line.ends_with("Short noise-excited string"));
    }

    #[test]
    fn test_export_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("init.toml");
        export_preset("init", &path, false).unwrap();
        assert!(export_preset("init", &path, false).is_err());
        export_preset("warm_pad", &path, true).unwrap();
        assert_eq!(VoicePreset::load(&path).unwrap().name, "Warm Pad");
    }
}
