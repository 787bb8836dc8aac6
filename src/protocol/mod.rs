// src/protocol/mod.rs
//! Stimulation protocol parameter model
//!
//! A [`StimulationProtocol`] is validated once at construction and never
//! mutated afterwards. Timing quantities such as the period and the pulse
//! width are derived on demand from PRF and duty cycle.

use crate::config::constants::protocol::*;
use crate::utils::time::frequency_to_period;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Protocol validation failure listing every offending field
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid stimulation protocol:\n- {}", .violations.join("\n- "))]
pub struct ProtocolError {
    pub violations: Vec<String>,
}

/// Immutable description of one stimulation session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StimulationProtocol {
    prf_hz: f64,
    duty_cycle: f64,
    vpp_mv: f64,
    carrier_khz: f64,
    duration_s: f64,
    mask_enabled: bool,
}

/// Plain parameter set accepted by [`StimulationProtocol::new`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    pub prf_hz: f64,
    pub duty_cycle: f64,
    pub vpp_mv: f64,
    pub carrier_khz: f64,
    pub duration_s: f64,
    pub mask_enabled: bool,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            prf_hz: DEFAULT_PRF_HZ,
            duty_cycle: DEFAULT_DUTY_CYCLE,
            vpp_mv: DEFAULT_VPP_MV,
            carrier_khz: DEFAULT_CARRIER_KHZ,
            duration_s: DEFAULT_DURATION_S,
            mask_enabled: true,
        }
    }
}

impl StimulationProtocol {
    /// Validate parameters and build the protocol
    pub fn new(params: ProtocolParams) -> Result<Self, ProtocolError> {
        let mut violations = Vec::new();

        if !(params.prf_hz.is_finite() && params.prf_hz > 0.0) {
            violations.push(format!("PRF must be > 0 Hz (got {})", params.prf_hz));
        }
        if !(params.duty_cycle > 0.0 && params.duty_cycle <= 1.0) {
            violations.push(format!(
                "Duty cycle must be in (0, 1] (got {})",
                params.duty_cycle
            ));
        }
        if !(params.duration_s.is_finite() && params.duration_s > 0.0) {
            violations.push(format!(
                "Duration must be > 0 seconds (got {})",
                params.duration_s
            ));
        }
        if !(params.vpp_mv.is_finite() && params.vpp_mv > 0.0) {
            violations.push(format!("Vpp must be > 0 mVpp (got {})", params.vpp_mv));
        }
        if !(params.carrier_khz.is_finite() && params.carrier_khz > 0.0) {
            violations.push(format!(
                "Carrier frequency must be > 0 kHz (got {})",
                params.carrier_khz
            ));
        }

        // Only meaningful once PRF and duty are individually sane
        if violations.is_empty() {
            let pulse_width_s = params.duty_cycle / params.prf_hz;
            if Duration::try_from_secs_f64(1.0 / params.prf_hz).is_err() {
                violations.push(format!(
                    "PRF of {} Hz gives a period too long to schedule",
                    params.prf_hz
                ));
            }
            if Duration::try_from_secs_f64(params.duration_s + 1.0 / params.prf_hz).is_err() {
                violations.push(format!(
                    "Duration of {} s is too long to schedule",
                    params.duration_s
                ));
            }
            if pulse_width_s < MIN_PULSE_WIDTH_S {
                violations.push(format!(
                    "Duty cycle and PRF result in a {:.3} ms burst (< {} ms). \
                     Increase duty or lower PRF.",
                    pulse_width_s * 1e3,
                    MIN_PULSE_WIDTH_S * 1e3
                ));
            }
        }

        if !violations.is_empty() {
            return Err(ProtocolError { violations });
        }

        Ok(Self {
            prf_hz: params.prf_hz,
            duty_cycle: params.duty_cycle,
            vpp_mv: params.vpp_mv,
            carrier_khz: params.carrier_khz,
            duration_s: params.duration_s,
            mask_enabled: params.mask_enabled,
        })
    }

    pub fn prf_hz(&self) -> f64 {
        self.prf_hz
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn vpp_mv(&self) -> f64 {
        self.vpp_mv
    }

    pub fn carrier_khz(&self) -> f64 {
        self.carrier_khz
    }

    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    pub fn mask_enabled(&self) -> bool {
        self.mask_enabled
    }

    /// Seconds between pulse onsets
    pub fn period_s(&self) -> f64 {
        1.0 / self.prf_hz
    }

    /// Seconds the output stays on within each period
    pub fn pulse_width_s(&self) -> f64 {
        self.duty_cycle / self.prf_hz
    }

    pub fn period(&self) -> Duration {
        frequency_to_period(self.prf_hz).unwrap_or_default()
    }

    pub fn pulse_width(&self) -> Duration {
        Duration::from_secs_f64(self.pulse_width_s())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_s)
    }

    /// Number of pulse onsets that fall inside the session
    ///
    /// A product landing a hair above an integer (e.g. `2.0000000001`) does
    /// not produce an extra sliver pulse at the end.
    pub fn pulse_count(&self) -> u64 {
        let exact = self.duration_s * self.prf_hz;
        (exact - PULSE_COUNT_TOLERANCE).ceil().max(0.0) as u64
    }

    pub fn params(&self) -> ProtocolParams {
        ProtocolParams {
            prf_hz: self.prf_hz,
            duty_cycle: self.duty_cycle,
            vpp_mv: self.vpp_mv,
            carrier_khz: self.carrier_khz,
            duration_s: self.duration_s,
            mask_enabled: self.mask_enabled,
        }
    }
}

impl Default for StimulationProtocol {
    fn default() -> Self {
        let defaults = ProtocolParams::default();
        Self {
            prf_hz: defaults.prf_hz,
            duty_cycle: defaults.duty_cycle,
            vpp_mv: defaults.vpp_mv,
            carrier_khz: defaults.carrier_khz,
            duration_s: defaults.duration_s,
            mask_enabled: defaults.mask_enabled,
        }
    }
}
