//! Offline rendering of notes through a voice preset.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Args;
use polyvox_config::{PolyphonyConfig, VoiceConfig, VoicePreset};
use polyvox_core::ChannelBuffer;
use polyvox_synth::{
    EngineSetup, FmVoice, KarplusStrongVoice, MidiVoice, NoteOn, OscillatorVoice, PadSynthVoice,
    SampleVoice, VoiceEngine,
};

use super::common::{load_preset, read_wav_mono, write_wav};

/// Largest pool the CLI renders with; presets cap it with `voice_limit`.
const MAX_POOL: usize = 32;

/// Silence kept after the last release when no duration is given.
const DEFAULT_TAIL_MS: f64 = 1500.0;

/// Render notes through a preset.
#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Preset name or path to a preset file
    #[arg(short, long, default_value = "init")]
    pub preset: String,

    /// MIDI notes (comma-separated, e.g., "60,64,67" for C major)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_values_t = [60, 64, 67],
        value_parser = clap::value_parser!(i32).range(0..=127)
    )]
    pub notes: Vec<i32>,

    /// How long each note is held, in ms
    #[arg(long, default_value = "1000.0")]
    pub note_length: f64,

    /// Delay between successive note starts, in ms (0 plays a chord)
    #[arg(long, default_value = "0.0")]
    pub spacing: f64,

    /// Note velocity (0-1)
    #[arg(long, default_value = "0.8")]
    pub velocity: f32,

    /// Total length in seconds (default: last release plus a tail)
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    pub sample_rate: u32,

    /// Block size in samples
    #[arg(long, default_value = "512")]
    pub block_size: usize,

    /// Output channels (1 or 2)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u16).range(1..=2))]
    pub channels: u16,

    /// Override the preset's voice limit
    #[arg(long)]
    pub voice_limit: Option<usize>,

    /// Drop notes instead of stealing when the pool is full
    #[arg(long)]
    pub no_steal: bool,

    /// Sample file for sampler presets
    #[arg(long)]
    pub sample: Option<PathBuf>,
}

/// When and what to play, independent of the voice type.
#[derive(Debug, Clone)]
struct NotePlan {
    /// `(time_ms, pitch, is_on)`, sorted by time.
    events: Vec<(f64, i32, bool)>,
    velocity: f32,
    total_frames: usize,
}

impl NotePlan {
    fn from_args(args: &RenderArgs) -> Self {
        let mut events = Vec::with_capacity(args.notes.len() * 2);
        for (i, &pitch) in args.notes.iter().enumerate() {
            let on = i as f64 * args.spacing;
            events.push((on, pitch, true));
            events.push((on + args.note_length, pitch, false));
        }
        // note-offs sort before note-ons at the same time
        events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));

        let last_off = events.last().map_or(0.0, |e| e.0);
        let seconds = args
            .duration
            .unwrap_or((last_off + DEFAULT_TAIL_MS) / 1000.0);
        Self {
            events,
            velocity: args.velocity,
            total_frames: (seconds * f64::from(args.sample_rate)).round() as usize,
        }
    }
}

/// Engine settings shared by every voice type.
struct RenderSettings {
    setup: EngineSetup,
    polyphony: PolyphonyConfig,
    channels: usize,
}

fn render_with<V: MidiVoice>(
    params: V::Params,
    plan: &NotePlan,
    settings: &RenderSettings,
) -> anyhow::Result<Vec<Vec<f32>>> {
    let mut engine: VoiceEngine<V, MAX_POOL> = VoiceEngine::new(&settings.setup, params);
    settings.polyphony.apply(engine.polyphony_mut());

    let block_size = settings.setup.max_block_size;
    let ms_per_sample = 1000.0 / f64::from(settings.setup.sample_rate);
    let mut block = ChannelBuffer::with_channels(block_size, settings.channels);
    let mut out = vec![Vec::with_capacity(plan.total_frames); settings.channels];
    let mut pending = plan.events.iter().peekable();

    let mut rendered = 0;
    while rendered < plan.total_frames {
        let len = block_size.min(plan.total_frames - rendered);
        let block_end = engine.current_time() + len as f64 * ms_per_sample;

        while let Some(&&(time, pitch, on)) = pending.peek() {
            if time >= block_end {
                break;
            }
            let queued = if on {
                engine.note_on(time, NoteOn::new(pitch, plan.velocity))
            } else {
                engine.note_off(time, pitch)
            };
            if queued.is_err() {
                bail!("note queue overflow at {time:.1} ms; use fewer simultaneous notes");
            }
            pending.next();
        }

        block.set_buffer_size(len);
        engine.render(&mut block);
        for (ch, dest) in out.iter_mut().enumerate() {
            dest.extend_from_slice(block.channel(ch));
        }
        rendered += len;
    }

    tracing::debug!(
        frames = rendered,
        active = engine.polyphony().active_voice_count(),
        "render finished"
    );
    Ok(out)
}

fn render_preset(
    preset: &VoicePreset,
    plan: &NotePlan,
    settings: &RenderSettings,
    sample: Option<&PathBuf>,
) -> anyhow::Result<Vec<Vec<f32>>> {
    match &preset.voice {
        VoiceConfig::Oscillator(c) => render_with::<OscillatorVoice>(c.to_params()?, plan, settings),
        VoiceConfig::Fm(c) => render_with::<FmVoice>(c.to_params()?, plan, settings),
        VoiceConfig::Karplus(c) => render_with::<KarplusStrongVoice>(c.to_params(), plan, settings),
        VoiceConfig::Pad(c) => render_with::<PadSynthVoice>(c.to_params()?, plan, settings),
        VoiceConfig::Sampler(c) => {
            let Some(path) = sample else {
                bail!("Preset '{}' is a sampler; pass the audio with --sample", preset.name);
            };
            let (data, rate) = read_wav_mono(path)?;
            render_with::<SampleVoice>(c.to_params(data, rate)?, plan, settings)
        }
    }
}

/// Run the render command.
pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if args.block_size == 0 {
        bail!("--block-size must be at least 1");
    }

    let preset = load_preset(&args.preset)?;
    preset
        .validate()
        .with_context(|| format!("Preset '{}' is invalid", preset.name))?;

    let mut polyphony = preset.polyphony;
    if let Some(limit) = args.voice_limit {
        polyphony.voice_limit = limit;
    }
    if args.no_steal {
        polyphony.allow_stealing = false;
    }
    if polyphony.voice_limit > MAX_POOL {
        tracing::warn!(requested = polyphony.voice_limit, max = MAX_POOL, "voice limit clamped");
    }

    let settings = RenderSettings {
        setup: EngineSetup::new(args.sample_rate as f32, args.block_size)
            .with_max_oversampling(polyphony.oversampling)
            .with_channels(usize::from(args.channels)),
        polyphony,
        channels: usize::from(args.channels),
    };
    let plan = NotePlan::from_args(&args);

    println!(
        "Rendering '{}' ({} voice), {} note(s)...",
        preset.name,
        preset.voice.kind(),
        args.notes.len()
    );
    tracing::info!(
        sample_rate = args.sample_rate,
        block_size = args.block_size,
        voice_limit = polyphony.voice_limit,
        "render config"
    );

    let output = render_preset(&preset, &plan, &settings, args.sample.as_ref())?;

    let peak = output
        .iter()
        .flatten()
        .fold(0.0_f32, |m, s| m.max(s.abs()));
    if peak > 1.0 {
        tracing::warn!(peak, "output exceeds full scale");
    }

    write_wav(&args.output, &output, args.sample_rate)?;
    println!(
        "Wrote {} frames ({:.2}s, peak {:.3}) to {}",
        plan.total_frames,
        plan.total_frames as f64 / f64::from(args.sample_rate),
        peak,
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(notes: &[i32]) -> RenderArgs {
        RenderArgs {
            output: PathBuf::from("out.wav"),
            preset: "init".to_string(),
            notes: notes.to_vec(),
            note_length: 100.0,
            spacing: 50.0,
            velocity: 1.0,
            duration: None,
            sample_rate: 48000,
            block_size: 256,
            channels: 2,
            voice_limit: None,
            no_steal: false,
            sample: None,
        }
    }

    #[test]
    fn test_plan_orders_events() {
        let plan = NotePlan::from_args(&args(&[60, 62, 64]));
        let times: Vec<f64> = plan.events.iter().map(|e| e.0).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(plan.events.len(), 6);
        // last note-off at 100 + 2 * 50 = 200 ms, plus the tail
        let expected = ((200.0 + DEFAULT_TAIL_MS) / 1000.0 * 48000.0_f64).round() as usize;
        assert_eq!(plan.total_frames, expected);
    }

    #[test]
    fn test_plan_puts_off_before_on() {
        let mut a = args(&[60, 60]);
        a.spacing = 100.0;
        let plan = NotePlan::from_args(&a);
        assert_eq!(plan.events[1], (100.0, 60, false));
        assert_eq!(plan.events[2], (100.0, 60, true));
    }

    #[test]
    fn test_render_produces_requested_length() {
        let mut a = args(&[60, 64]);
        a.duration = Some(0.1);
        let preset = polyvox_config::get_factory_preset("init").unwrap();
        let settings = RenderSettings {
            setup: EngineSetup::new(48000.0, a.block_size),
            polyphony: preset.polyphony,
            channels: 2,
        };
        let plan = NotePlan::from_args(&a);
        let out = render_preset(&preset, &plan, &settings, None).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 4800);
        assert!(out[0].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_sampler_requires_sample_file() {
        let preset = VoicePreset::new("S", VoiceConfig::Sampler(Default::default()));
        let settings = RenderSettings {
            setup: EngineSetup::default(),
            polyphony: preset.polyphony,
            channels: 1,
        };
        let plan = NotePlan::from_args(&args(&[60]));
        assert!(render_preset(&preset, &plan, &settings, None).is_err());
    }
}
