//! Shared CLI helpers used across multiple commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use polyvox_config::{VoicePreset, resolve_preset};

/// Load a preset by factory name, user/system preset name, or file path.
pub fn load_preset(name: &str) -> anyhow::Result<VoicePreset> {
    resolve_preset(name).with_context(|| {
        format!("Could not load preset '{name}'. Use 'polyvox presets list' to see available presets.")
    })
}

/// Write per-channel buffers as an interleaved 32-bit float WAV.
pub fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> anyhow::Result<()> {
    let Some(frames) = channels.first().map(Vec::len) else {
        bail!("Nothing to write");
    };
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for i in 0..frames {
        for channel in channels {
            writer.write_sample(channel[i])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Read a WAV file as mono samples, averaging channels. Returns the data
/// and its sample rate.
pub fn read_wav_mono(path: &Path) -> anyhow::Result<(Arc<[f32]>, f32)> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono: Arc<[f32]> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wav_round_trip_mixes_to_mono() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wav");
        write_wav(&path, &[vec![0.5, -0.5, 0.25], vec![0.5, 0.5, 0.75]], 44100).unwrap();

        let (data, rate) = read_wav_mono(&path).unwrap();
        assert_eq!(rate, 44100.0);
        assert_eq!(&data[..], &[0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_load_missing_preset_mentions_name() {
        let err = load_preset("no_such_preset_12345").unwrap_err();
        assert!(err.to_string().contains("no_such_preset_12345"));
    }
}
