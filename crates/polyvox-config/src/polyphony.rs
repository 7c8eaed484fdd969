//! Voice pool settings stored with a preset.

use polyvox_synth::{DEFAULT_NUM_VOICES, MidiVoice, PolyphonyMgr, RetriggerPolicy};
use serde::{Deserialize, Serialize};

/// How many voices a preset may use and how they are reused.
///
/// # TOML Format
///
/// ```toml
/// [polyphony]
/// voice_limit = 8
/// allow_stealing = true
/// oversampling = 2
/// retrigger = "always_preserve"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolyphonyConfig {
    /// Slots that may be allocated.
    pub voice_limit: usize,
    /// Steal the oldest note when every slot is busy.
    pub allow_stealing: bool,
    /// Voice oversampling factor, a power of two.
    pub oversampling: usize,
    /// Treatment of a note aimed at an occupied slot.
    pub retrigger: RetriggerPolicy,
}

impl Default for PolyphonyConfig {
    fn default() -> Self {
        Self {
            voice_limit: DEFAULT_NUM_VOICES,
            allow_stealing: true,
            oversampling: 1,
            retrigger: RetriggerPolicy::default(),
        }
    }
}

impl PolyphonyConfig {
    /// Applies these settings to a voice pool. Values beyond what the pool
    /// supports are clamped by the pool.
    pub fn apply<V: MidiVoice, const N: usize>(&self, mgr: &mut PolyphonyMgr<V, N>) {
        mgr.set_voice_limit(self.voice_limit);
        mgr.set_allow_stealing(self.allow_stealing);
        mgr.set_oversampling(self.oversampling);
        mgr.set_retrigger_policy(self.retrigger);
    }
}
