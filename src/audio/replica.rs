// src/audio/replica.rs
//! Pulse-replica sham generator
//!
//! Builds a family of masks, one per carrier frequency, each a train of
//! Hann-windowed square-wave pulses. Pulses come in groups of five whose
//! onset intervals sum to exactly one second, so the long-run rate is 5 Hz
//! while individual intervals wander by up to ±15 ms. White noise is added
//! at a fixed signal-to-noise ratio to mimic circuit hiss.

use crate::audio::noise_models::{hann_window, rms, square_wave, NoiseModel};
use crate::audio::wav::write_wav;
use crate::audio::{AudioError, AudioMask, AudioResult};
use crate::config::constants::audio::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Replica batch parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaParams {
    pub n_files: usize,
    pub freq_min_hz: f64,
    pub freq_max_hz: f64,
    pub pulse_duration_s: f64,
    /// Must be a multiple of the group size (5)
    pub total_pulses: usize,
    pub sample_rate: u32,
    pub total_duration_s: f64,
    /// Extra per-pulse jitter on top of the group pattern
    pub jitter_ms: f64,
    pub snr_ratio: f64,
    pub seed: u64,
}

impl Default for ReplicaParams {
    fn default() -> Self {
        Self {
            n_files: DEFAULT_REPLICA_FILES,
            freq_min_hz: DEFAULT_REPLICA_FREQ_MIN_HZ,
            freq_max_hz: DEFAULT_REPLICA_FREQ_MAX_HZ,
            pulse_duration_s: DEFAULT_REPLICA_PULSE_DURATION_S,
            total_pulses: DEFAULT_REPLICA_TOTAL_PULSES,
            sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            total_duration_s: crate::config::constants::protocol::DEFAULT_DURATION_S,
            jitter_ms: 0.0,
            snr_ratio: DEFAULT_SNR_RATIO,
            seed: DEFAULT_SEED,
        }
    }
}

impl ReplicaParams {
    pub fn validate(&self) -> AudioResult<()> {
        if self.n_files == 0 {
            return Err(AudioError::InvalidParameters("n_files must be > 0".to_string()));
        }
        if !(self.freq_min_hz < self.freq_max_hz) {
            return Err(AudioError::InvalidParameters(
                "freq range must be (min, max) with min < max".to_string(),
            ));
        }
        if self.total_pulses % REPLICA_GROUP_SIZE != 0 {
            return Err(AudioError::InvalidParameters(format!(
                "total_pulses must be a multiple of {}",
                REPLICA_GROUP_SIZE
            )));
        }
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidParameters("sample_rate must be > 0".to_string()));
        }
        if !(self.pulse_duration_s > 0.0) || !(self.total_duration_s > 0.0) {
            return Err(AudioError::InvalidParameters(
                "pulse and total durations must be > 0".to_string(),
            ));
        }
        if !(self.snr_ratio > 0.0) || self.jitter_ms < 0.0 {
            return Err(AudioError::InvalidParameters(
                "snr_ratio must be > 0 and jitter_ms >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Carrier frequencies evenly spaced over the range, endpoints included
    pub fn frequencies(&self) -> Vec<f64> {
        if self.n_files == 1 {
            return vec![self.freq_min_hz];
        }
        let step = (self.freq_max_hz - self.freq_min_hz) / (self.n_files - 1) as f64;
        let mut freqs: Vec<f64> = (0..self.n_files)
            .map(|i| self.freq_min_hz + step * i as f64)
            .collect();
        // Accumulated rounding must not pull the top file name below the maximum
        if let Some(last) = freqs.last_mut() {
            *last = self.freq_max_hz;
        }
        freqs
    }

    pub fn file_name(freq_hz: f64) -> String {
        format!("sham_replica_{}Hz.wav", freq_hz as u64)
    }
}

/// One windowed square-wave pulse
fn pulse_shape(freq_hz: f64, params: &ReplicaParams) -> Vec<f64> {
    let fs = params.sample_rate as f64;
    let len = (fs * params.pulse_duration_s) as usize;
    let window = hann_window(len);
    let dt = params.pulse_duration_s / len.max(1) as f64;
    window
        .iter()
        .enumerate()
        .map(|(n, w)| DEFAULT_TONE_AMPLITUDE * square_wave(freq_hz, n as f64 * dt) * w)
        .collect()
}

/// Onset-to-onset intervals in seconds for the whole train
fn pulse_intervals(params: &ReplicaParams, noise: &mut NoiseModel) -> Vec<f64> {
    let n_groups = params.total_pulses / REPLICA_GROUP_SIZE;
    let nominal_ms = REPLICA_GROUP_DURATION_MS / REPLICA_GROUP_SIZE as f64;
    let min_interval_ms = params.pulse_duration_s * 1e3 + 1.0;
    let mut intervals = Vec::with_capacity(params.total_pulses);

    for _ in 0..n_groups {
        let mut jitters: Vec<f64> = (0..REPLICA_GROUP_SIZE)
            .map(|_| noise.uniform(-REPLICA_GROUP_JITTER_MS, REPLICA_GROUP_JITTER_MS))
            .collect();
        let mean = jitters.iter().sum::<f64>() / jitters.len() as f64;
        jitters.iter_mut().for_each(|j| *j -= mean);

        let mut group: Vec<f64> = jitters.iter().map(|j| (nominal_ms + j).round()).collect();
        // Rounding may leave the group a millisecond off; the last interval absorbs it
        let diff = REPLICA_GROUP_DURATION_MS - group.iter().sum::<f64>();
        if let Some(last) = group.last_mut() {
            *last += diff;
        }

        if params.jitter_ms > 0.0 {
            for interval in group.iter_mut() {
                *interval += noise.uniform(-params.jitter_ms, params.jitter_ms);
                *interval = interval.max(min_interval_ms);
            }
        }

        intervals.extend(group.into_iter().map(|ms| ms / 1e3));
    }
    intervals
}

/// Build the replica mask for one carrier frequency
pub fn generate_replica(freq_hz: f64, params: &ReplicaParams, seed: u64) -> AudioResult<AudioMask> {
    params.validate()?;
    let fs = params.sample_rate as f64;
    let mut noise = NoiseModel::new(seed);

    let pulse = pulse_shape(freq_hz, params);
    let mut audio = Vec::new();
    for interval in pulse_intervals(params, &mut noise) {
        audio.extend_from_slice(&pulse);
        let silence = (fs * (interval - params.pulse_duration_s)).max(0.0) as usize;
        audio.resize(audio.len() + silence, 0.0);
    }

    let target_noise_rms = rms(&audio) / params.snr_ratio;
    let mut hiss = noise.gaussian_buffer(audio.len());
    let hiss_rms = rms(&hiss);
    if hiss_rms > 0.0 {
        let gain = target_noise_rms / hiss_rms;
        hiss.iter_mut().for_each(|h| *h *= gain);
    }

    let expected_len = (fs * params.total_duration_s) as usize;
    let mut samples: Vec<f32> = audio
        .iter()
        .zip(hiss.iter())
        .map(|(a, h)| (a + h).clamp(-1.0, 1.0) as f32)
        .collect();
    samples.resize(expected_len, 0.0);

    AudioMask::new(params.sample_rate, 1, samples)
}

/// Generate and write the whole batch, one file per frequency, in parallel
pub fn generate_replica_batch(
    params: &ReplicaParams,
    output_dir: &Path,
) -> AudioResult<Vec<PathBuf>> {
    params.validate()?;
    std::fs::create_dir_all(output_dir)?;

    params
        .frequencies()
        .into_par_iter()
        .enumerate()
        .map(|(i, freq)| {
            let mask = generate_replica(freq, params, params.seed.wrapping_add(i as u64))?;
            let path = output_dir.join(ReplicaParams::file_name(freq));
            write_wav(&mask, &path)?;
            info!(path = %path.display(), "Written");
            Ok(path)
        })
        .collect()
}
