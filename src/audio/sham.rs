// src/audio/sham.rs
//! Gated sham audio generator
//!
//! Reproduces what a subject hears from the stimulation rig: within every
//! PRF period the first `duty_cycle` fraction carries a square-wave tone (the
//! AWG's switching buzz) plus noise, the rest only a low noise floor.

use crate::audio::noise_models::{normalize_peak, square_wave, NoiseModel};
use crate::audio::{AudioError, AudioMask, AudioResult};
use crate::config::constants::audio::*;
use serde::{Deserialize, Serialize};

/// Parameters of a gated sham track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShamParams {
    pub prf_hz: f64,
    /// Fraction of each period carrying the tone; 0 gives a noise-only track
    pub duty_cycle: f64,
    pub duration_s: f64,
    pub sample_rate: u32,
    #[serde(default = "defaults::tone_hz")]
    pub tone_hz: f64,
    #[serde(default = "defaults::tone_amplitude")]
    pub tone_amplitude: f64,
    /// Noise level under the tone
    #[serde(default = "defaults::tone_noise")]
    pub tone_noise: f64,
    /// Noise level between bursts
    #[serde(default = "defaults::noise_floor")]
    pub noise_floor: f64,
    #[serde(default = "defaults::peak_ceiling")]
    pub peak_ceiling: f64,
    #[serde(default = "defaults::seed")]
    pub seed: u64,
}

mod defaults {
    use super::*;

    pub fn tone_hz() -> f64 {
        DEFAULT_TONE_HZ
    }
    pub fn tone_amplitude() -> f64 {
        DEFAULT_TONE_AMPLITUDE
    }
    pub fn tone_noise() -> f64 {
        DEFAULT_TONE_AMPLITUDE / DEFAULT_SNR_RATIO
    }
    pub fn noise_floor() -> f64 {
        DEFAULT_NOISE_FLOOR
    }
    pub fn peak_ceiling() -> f64 {
        DEFAULT_PEAK_CEILING
    }
    pub fn seed() -> u64 {
        DEFAULT_SEED
    }
}

impl Default for ShamParams {
    fn default() -> Self {
        Self {
            prf_hz: crate::config::constants::protocol::DEFAULT_PRF_HZ,
            duty_cycle: crate::config::constants::protocol::DEFAULT_DUTY_CYCLE,
            duration_s: crate::config::constants::protocol::DEFAULT_DURATION_S,
            sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            tone_hz: defaults::tone_hz(),
            tone_amplitude: defaults::tone_amplitude(),
            tone_noise: defaults::tone_noise(),
            noise_floor: defaults::noise_floor(),
            peak_ceiling: defaults::peak_ceiling(),
            seed: defaults::seed(),
        }
    }
}

impl ShamParams {
    pub fn validate(&self) -> AudioResult<()> {
        let mut errors = Vec::new();

        if !(self.prf_hz.is_finite() && self.prf_hz > 0.0) {
            errors.push(format!("prf_hz must be > 0 (got {})", self.prf_hz));
        }
        if !(0.0..=1.0).contains(&self.duty_cycle) {
            errors.push(format!("duty_cycle must be in [0, 1] (got {})", self.duty_cycle));
        }
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            errors.push(format!("duration_s must be > 0 (got {})", self.duration_s));
        }
        if self.sample_rate == 0 {
            errors.push("sample_rate must be > 0".to_string());
        } else if !(self.tone_hz > 0.0 && self.tone_hz <= self.sample_rate as f64 / 2.0) {
            errors.push(format!(
                "tone_hz must be in (0, {}] (got {})",
                self.sample_rate as f64 / 2.0,
                self.tone_hz
            ));
        }
        if self.tone_amplitude < 0.0 || self.tone_noise < 0.0 || self.noise_floor < 0.0 {
            errors.push("amplitudes must be >= 0".to_string());
        }
        if !(self.peak_ceiling > 0.0 && self.peak_ceiling <= 1.0) {
            errors.push(format!(
                "peak_ceiling must be in (0, 1] (got {})",
                self.peak_ceiling
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AudioError::InvalidParameters(errors.join("; ")))
        }
    }

    /// Number of samples the track will contain
    pub fn sample_count(&self) -> usize {
        (self.duration_s * self.sample_rate as f64).round() as usize
    }

    /// Samples per PRF period, possibly fractional
    pub fn period_samples(&self) -> f64 {
        self.sample_rate as f64 / self.prf_hz
    }
}

/// Builds gated sham tracks
pub struct ShamAudioGenerator {
    params: ShamParams,
}

impl ShamAudioGenerator {
    pub fn new(params: ShamParams) -> AudioResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ShamParams {
        &self.params
    }

    /// Whether sample `index` falls in the tone part of its period
    pub fn is_gated(&self, index: usize) -> bool {
        let duty = self.params.duty_cycle;
        if duty >= 1.0 {
            return true;
        }
        if duty <= 0.0 {
            return false;
        }
        let period = self.params.period_samples();
        (index as f64).rem_euclid(period) < duty * period
    }

    /// Synthesize the mono track
    pub fn generate(&self) -> AudioResult<AudioMask> {
        let p = &self.params;
        let len = p.sample_count();
        let sample_rate = p.sample_rate as f64;
        let mut noise = NoiseModel::new(p.seed);

        let mut samples: Vec<f64> = (0..len)
            .map(|i| {
                // Draw noise for every sample so the noise sequence does not
                // depend on the gate pattern
                let n = noise.gaussian();
                if self.is_gated(i) {
                    let t = i as f64 / sample_rate;
                    p.tone_amplitude * square_wave(p.tone_hz, t) + p.tone_noise * n
                } else {
                    p.noise_floor * n
                }
            })
            .collect();

        normalize_peak(&mut samples, p.peak_ceiling);

        AudioMask::new(
            p.sample_rate,
            1,
            samples.into_iter().map(|s| s as f32).collect(),
        )
    }
}
