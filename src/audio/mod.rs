// src/audio/mod.rs
//! Auditory masking: sham audio synthesis, WAV persistence and playback

pub mod noise_models;
pub mod sham;
pub mod replica;
pub mod wav;
pub mod playback;

#[cfg(feature = "playback")]
pub use playback::CpalMaskPlayer;
pub use playback::{MaskPlayer, SilentMaskPlayer};
pub use replica::{generate_replica, generate_replica_batch, ReplicaParams};
pub use wav::{read_wav, write_wav};
pub use sham::{ShamAudioGenerator, ShamParams};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Audio generation and playback errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid audio parameters: {0}")]
    InvalidParameters(String),

    #[error("audio file not found: {0}")]
    MissingFile(PathBuf),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("audio playback error: {0}")]
    Playback(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Fixed-length interleaved sample buffer in [-1, 1]
///
/// Built once by a generator or loaded from disk; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMask {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl AudioMask {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> AudioResult<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidParameters(
                "sample rate must be > 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(AudioError::InvalidParameters(
                "channel count must be > 0".to_string(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidParameters(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Sample of `channel` at `frame`
    pub fn frame_sample(&self, frame: usize, channel: u16) -> f32 {
        self.samples[frame * self.channels as usize + channel as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_geometry() {
        let mask = AudioMask::new(4, 2, vec![0.0, 0.1, 0.2, 0.3, 0.4, -0.5, 0.6, 0.7]).unwrap();
        assert_eq!(mask.frames(), 4);
        assert_eq!(mask.duration(), Duration::from_secs(1));
        assert_eq!(mask.frame_sample(2, 1), -0.5);
        assert_eq!(mask.peak(), 0.7);
    }

    #[test]
    fn test_mask_rejects_ragged_buffer() {
        assert!(AudioMask::new(44_100, 2, vec![0.0; 3]).is_err());
        assert!(AudioMask::new(0, 1, vec![]).is_err());
        assert!(AudioMask::new(44_100, 0, vec![]).is_err());
    }
}
