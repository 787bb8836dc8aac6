// src/audio/wav.rs
//! WAV persistence for masks (16-bit PCM)

use crate::audio::{AudioError, AudioMask, AudioResult};
use crate::config::constants::audio::BITS_PER_SAMPLE;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Quantize a [-1, 1] sample to 16-bit PCM
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Write `mask` to `path`, creating parent directories as needed
pub fn write_wav(mask: &AudioMask, path: &Path) -> AudioResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let spec = WavSpec {
        channels: mask.channels(),
        sample_rate: mask.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in mask.samples() {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Load a WAV file of any PCM or float layout into a mask
pub fn read_wav(path: &Path) -> AudioResult<AudioMask> {
    if !path.exists() {
        return Err(AudioError::MissingFile(path.to_path_buf()));
    }

    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    AudioMask::new(spec.sample_rate, spec.channels, samples)
}
