// src/audio/noise_models.rs
//! Noise and tone primitives for sham audio

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seedable white Gaussian noise source
pub struct NoiseModel {
    rng: StdRng,
    spare: Option<f64>,
}

impl NoiseModel {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spare: None,
        }
    }

    /// Standard normal sample
    pub fn gaussian(&mut self) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        // Box-Muller; u1 kept away from 0 so ln stays finite
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f64::consts::PI * u2;
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }

    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    /// `len` standard normal samples
    pub fn gaussian_buffer(&mut self, len: usize) -> Vec<f64> {
        (0..len).map(|_| self.gaussian()).collect()
    }
}

/// Bipolar square wave: +1 for the first half of each cycle, -1 for the second
pub fn square_wave(frequency_hz: f64, t_s: f64) -> f64 {
    let phase = (frequency_hz * t_s).rem_euclid(1.0);
    if phase < 0.5 {
        1.0
    } else {
        -1.0
    }
}

/// Symmetric Hann window of length `len`
pub fn hann_window(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f64;
            (0..len)
                .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / denom).cos())
                .collect()
        }
    }
}

pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64).sqrt()
}

/// Scale `samples` down so the largest magnitude is at most `ceiling`
pub fn normalize_peak(samples: &mut [f64], ceiling: f64) {
    let peak = samples.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    if peak > ceiling && peak > 0.0 {
        let gain = ceiling / peak;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}
