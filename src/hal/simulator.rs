// src/hal/simulator.rs
//! Simulated waveform generator for running protocols without hardware
//!
//! Every call is validated the way a real instrument would validate it,
//! logged through `tracing`, and appended to a shared [`CallJournal`] so
//! tests can inspect the exact sequence of hardware interactions.

use crate::hal::{Awg, AwgCall, DeviceLimits, DeviceSettings, DeviceType, HalError, HalResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared, append-only record of calls made on a simulated AWG
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<AwgCall>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: AwgCall) {
        self.calls.lock().push(call);
    }

    /// Copy of all calls recorded so far
    pub fn snapshot(&self) -> Vec<AwgCall> {
        self.calls.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Number of off-to-on output transitions
    pub fn output_on_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, AwgCall::SetOutput(true)))
            .count()
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    pub limits: DeviceLimits,
}

/// Mock AWG
pub struct SimulatedAwg {
    config: SimulatorConfig,
    journal: CallJournal,
    configured: Option<DeviceSettings>,
    output_on: bool,
    closed: bool,
    transitions: u64,
}

impl SimulatedAwg {
    pub fn new(config: SimulatorConfig) -> Self {
        info!("AWG mock open");
        Self {
            config,
            journal: CallJournal::new(),
            configured: None,
            output_on: false,
            closed: false,
            transitions: 0,
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(SimulatorConfig::default())
    }

    /// Handle onto this device's call journal
    pub fn journal(&self) -> CallJournal {
        self.journal.clone()
    }

    pub fn is_output_on(&self) -> bool {
        self.output_on
    }

    /// Output state changes seen so far, in either direction
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn current_settings(&self) -> Option<&DeviceSettings> {
        self.configured.as_ref()
    }

    fn ensure_open(&self) -> HalResult<()> {
        if self.closed {
            Err(HalError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Awg for SimulatedAwg {
    fn configure(&mut self, settings: &DeviceSettings) -> HalResult<()> {
        self.ensure_open()?;
        self.journal.push(AwgCall::Configure(settings.clone()));
        self.config.limits.check(settings)?;

        info!(
            carrier_hz = settings.carrier_hz,
            amplitude_vpp = settings.amplitude_vpp,
            gate_width_s = settings.gate_width_s,
            burst_period_s = settings.burst_period_s,
            burst_cycles = settings.burst_cycles,
            "AWG mock upload parameters"
        );
        self.configured = Some(settings.clone());
        Ok(())
    }

    fn set_output(&mut self, on: bool) -> HalResult<()> {
        self.ensure_open()?;
        self.journal.push(AwgCall::SetOutput(on));

        if on && self.configured.is_none() {
            return Err(HalError::Configuration(
                "output enabled before parameters were uploaded".to_string(),
            ));
        }

        if on != self.output_on {
            self.transitions += 1;
            debug!(transition = self.transitions, on, "AWG mock output");
        }
        self.output_on = on;
        Ok(())
    }

    fn close(&mut self) -> HalResult<()> {
        self.ensure_open()?;
        self.journal.push(AwgCall::Close);
        self.output_on = false;
        self.closed = true;
        info!(transitions = self.transitions, "AWG mock close");
        Ok(())
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Simulator
    }

    fn describe(&self) -> String {
        "simulated AWG".to_string()
    }
}
