//! Engine limits and supported voice types.

use polyvox_config::{MAX_OVERSAMPLING, MAX_VOICE_LIMIT, VoiceConfig};
use polyvox_synth::{
    ADSR_EVENT_SLOTS, ADSR_STATE_REVISION, DEFAULT_NUM_VOICES, MAX_ADSR_STAGES, MAX_UNISON,
    PAD_TABLE_SIZE, VOICE_FADE_SAMPLES,
};

fn describe(kind: &str) -> &'static str {
    match kind {
        "oscillator" => "unison oscillator with filter and sync",
        "fm" => "three-operator FM with index envelopes",
        "karplus" => "Karplus-Strong plucked string",
        "sampler" => "sample playback (needs --sample)",
        "pad" => "PADsynth wavetable",
        _ => "",
    }
}

/// Run the info command.
pub fn run() -> anyhow::Result<()> {
    println!("polyvox {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Voices:        {DEFAULT_NUM_VOICES} per pool by default (preset limit up to {MAX_VOICE_LIMIT})");
    println!("Steal fade:    {VOICE_FADE_SAMPLES} samples");
    println!("Oversampling:  up to {MAX_OVERSAMPLING}x");
    println!("Envelope:      {MAX_ADSR_STAGES} stages, {ADSR_EVENT_SLOTS} overlapping events, state revision {ADSR_STATE_REVISION}");
    println!("Unison:        up to {MAX_UNISON}");
    println!("Pad table:     {PAD_TABLE_SIZE} samples");
    println!();
    println!("Voice types:");
    for kind in VoiceConfig::KINDS {
        println!("  {kind:12} {}", describe(kind));
    }
    Ok(())
}
