// src/hal/types.rs
//! Core types for AWG and trigger abstraction

use crate::config::constants::hal::*;
use crate::protocol::StimulationProtocol;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device-level settings derived from a stimulation protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSettings {
    pub carrier_hz: f64,
    pub amplitude_vpp: f64,
    pub gate_width_s: f64,
    pub burst_period_s: f64,
    pub burst_cycles: u64,
}

impl DeviceSettings {
    pub fn from_protocol(protocol: &StimulationProtocol) -> Self {
        let carrier_hz = protocol.carrier_khz() * 1e3;
        let gate_width_s = protocol.pulse_width_s();
        Self {
            carrier_hz,
            amplitude_vpp: protocol.vpp_mv() / 1e3,
            gate_width_s,
            burst_period_s: protocol.period_s(),
            burst_cycles: ((carrier_hz * gate_width_s).round() as u64).max(1),
        }
    }
}

/// Ranges a waveform generator accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub min_carrier_hz: f64,
    pub max_carrier_hz: f64,
    pub min_amplitude_vpp: f64,
    pub max_amplitude_vpp: f64,
    pub max_burst_cycles: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_carrier_hz: DEFAULT_MIN_CARRIER_HZ,
            max_carrier_hz: DEFAULT_MAX_CARRIER_HZ,
            min_amplitude_vpp: DEFAULT_MIN_AMPLITUDE_VPP,
            max_amplitude_vpp: DEFAULT_MAX_AMPLITUDE_VPP,
            max_burst_cycles: DEFAULT_MAX_BURST_CYCLES,
        }
    }
}

impl DeviceLimits {
    /// Check settings against the limits, reporting the first violation
    pub fn check(&self, settings: &DeviceSettings) -> Result<(), HalError> {
        if !(self.min_carrier_hz..=self.max_carrier_hz).contains(&settings.carrier_hz) {
            return Err(HalError::Configuration(format!(
                "carrier {} Hz outside [{}, {}] Hz",
                settings.carrier_hz, self.min_carrier_hz, self.max_carrier_hz
            )));
        }
        if !(self.min_amplitude_vpp..=self.max_amplitude_vpp).contains(&settings.amplitude_vpp) {
            return Err(HalError::Configuration(format!(
                "amplitude {} Vpp outside [{}, {}] Vpp",
                settings.amplitude_vpp, self.min_amplitude_vpp, self.max_amplitude_vpp
            )));
        }
        if settings.burst_cycles > self.max_burst_cycles {
            return Err(HalError::Configuration(format!(
                "burst of {} cycles exceeds maximum of {}",
                settings.burst_cycles, self.max_burst_cycles
            )));
        }
        if settings.gate_width_s > settings.burst_period_s {
            return Err(HalError::Configuration(format!(
                "gate width {} s longer than burst period {} s",
                settings.gate_width_s, settings.burst_period_s
            )));
        }
        Ok(())
    }
}

/// How a burst is gated on the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingMode {
    /// Triggered burst of N carrier cycles per software trigger
    #[default]
    BusTrigger,
    /// Continuous carrier, output relay switched on and off
    OutputGate,
}

/// Hardware call issued through an AWG session, in issue order
#[derive(Debug, Clone, PartialEq)]
pub enum AwgCall {
    Configure(DeviceSettings),
    SetOutput(bool),
    Close,
}

/// Device connection types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Simulator,
    Tcp,
    Serial,
}

/// Errors raised by AWG and trigger hardware
#[derive(Debug, Error)]
pub enum HalError {
    /// Device rejected the requested parameters
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Device could not be reached
    #[error("connection error: {target}: {reason}")]
    Connection { target: String, reason: String },

    /// Device answered something we could not interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("session already closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HalError {
    pub fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        HalError::Connection {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

pub type HalResult<T> = Result<T, HalError>;
