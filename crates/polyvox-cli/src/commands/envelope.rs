//! Envelope inspection: sample an ADSR over time and print CSV.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Args;
use polyvox_config::EnvelopeConfig;
use polyvox_synth::Adsr;

/// Print `time,value,stage` rows for an envelope.
#[derive(Args)]
pub struct EnvelopeArgs {
    /// Attack time in ms
    #[arg(short, long, default_value = "10.0")]
    pub attack: f32,

    /// Decay time in ms
    #[arg(short, long, default_value = "100.0")]
    pub decay: f32,

    /// Sustain level (0-1)
    #[arg(short, long, default_value = "0.7")]
    pub sustain: f32,

    /// Release time in ms
    #[arg(short, long, default_value = "200.0")]
    pub release: f32,

    /// Force the release after holding the sustain this long, in ms
    #[arg(long)]
    pub hold: Option<f32>,

    /// Note-off time in ms; without it the note is held
    #[arg(long)]
    pub off: Option<f64>,

    /// Sampling step in ms
    #[arg(long, default_value = "10.0")]
    pub step: f64,

    /// Last time to print, in ms (default: note-off plus release)
    #[arg(long)]
    pub end: Option<f64>,

    /// Write the envelope state after the note-off to this file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Read a saved envelope state instead of building one
    #[arg(long, conflicts_with_all = ["attack", "decay", "sustain", "release", "hold", "off", "save"])]
    pub load: Option<PathBuf>,
}

fn build(args: &EnvelopeArgs) -> anyhow::Result<Adsr> {
    let mut config = EnvelopeConfig::adsr(args.attack, args.decay, args.sustain, args.release);
    config.hold = args.hold;
    let mut adsr = config.to_adsr().context("Invalid envelope settings")?;

    adsr.start(0.0, 1.0);
    if let Some(off) = args.off {
        let outcome = adsr.stop(off, true);
        tracing::debug!(off, ?outcome, "note-off");
    }
    Ok(adsr)
}

fn load(path: &Path) -> anyhow::Result<Adsr> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut adsr = Adsr::default();
    adsr.load_state(&mut BufReader::new(file))
        .with_context(|| format!("Failed to read envelope state from {}", path.display()))?;
    Ok(adsr)
}

/// Last time worth printing when none was given.
fn default_end(adsr: &Adsr, off: Option<f64>) -> f64 {
    let attack_decay = f64::from(adsr.attack() + adsr.decay());
    let release = f64::from(adsr.release());
    let held = off.unwrap_or(attack_decay + 500.0);
    held + release
}

/// Writes the CSV rows to `out`.
fn write_csv(adsr: &Adsr, step: f64, end: f64, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "time,value,stage")?;
    let steps = (end / step).floor() as usize;
    for i in 0..=steps {
        let time = i as f64 * step;
        let (stage, _) = adsr.stage_at(time);
        writeln!(out, "{time:.3},{:.6},{stage}", adsr.value(time))?;
    }
    Ok(())
}

/// Run the envelope command.
pub fn run(args: EnvelopeArgs) -> anyhow::Result<()> {
    if !(args.step > 0.0) {
        bail!("--step must be positive");
    }

    let adsr = match &args.load {
        Some(path) => load(path)?,
        None => build(&args)?,
    };
    let off = if args.load.is_some() { None } else { args.off };
    let end = args.end.unwrap_or_else(|| default_end(&adsr, off));

    if let Some(path) = &args.save {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        adsr.save_state(&mut writer)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "envelope state saved");
    }

    let stdout = std::io::stdout();
    write_csv(&adsr, args.step, end, &mut stdout.lock())?;
    Ok(())
}
