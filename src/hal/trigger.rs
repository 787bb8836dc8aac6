// src/hal/trigger.rs
//! EEG trigger output
//!
//! The Biosemi USB trigger interface turns every byte written to its serial
//! port into a short pulse on the trigger lines whose bits are set: `0b0001`
//! fires line 1, `0b0010` line 2, `0b0011` both.

use crate::config::constants::trigger::*;
use crate::hal::{HalError, HalResult, TriggerPort};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};

/// Trigger interface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Serial device; triggers are disabled when unset
    #[serde(default)]
    pub port_name: Option<String>,
    #[serde(default = "defaults::baud_rate")]
    pub baud_rate: u32,
    /// Settle time after opening the port before the first pulse
    #[serde(default = "defaults::initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "defaults::start_code")]
    pub start_code: u8,
    #[serde(default = "defaults::stop_code")]
    pub stop_code: u8,
}

mod defaults {
    use super::*;

    pub fn baud_rate() -> u32 {
        DEFAULT_BAUD_RATE
    }
    pub fn initial_delay_ms() -> u64 {
        DEFAULT_INITIAL_DELAY_MS
    }
    pub fn start_code() -> u8 {
        DEFAULT_START_CODE
    }
    pub fn stop_code() -> u8 {
        DEFAULT_STOP_CODE
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: defaults::baud_rate(),
            initial_delay_ms: defaults::initial_delay_ms(),
            start_code: defaults::start_code(),
            stop_code: defaults::stop_code(),
        }
    }
}

/// Marker codes sent at session boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerCodes {
    pub start: u8,
    pub stop: u8,
}

impl Default for MarkerCodes {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_CODE,
            stop: DEFAULT_STOP_CODE,
        }
    }
}

impl From<&TriggerConfig> for MarkerCodes {
    fn from(config: &TriggerConfig) -> Self {
        Self {
            start: config.start_code,
            stop: config.stop_code,
        }
    }
}

/// Biosemi USB trigger interface on a serial port
pub struct BiosemiTrigger<W: Write + Send = Box<dyn serialport::SerialPort>> {
    port: W,
    name: String,
}

impl BiosemiTrigger {
    /// Open the serial port and wait for the interface to settle
    pub fn open(config: &TriggerConfig) -> HalResult<Self> {
        let port_name = config
            .port_name
            .as_deref()
            .ok_or_else(|| HalError::Configuration("no trigger port configured".to_string()))?;

        let port = serialport::new(port_name, config.baud_rate)
            .timeout(Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS))
            .open()
            .map_err(|e| HalError::connection(port_name, e))?;

        if config.initial_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(config.initial_delay_ms));
        }
        info!(port = port_name, "Trigger interface opened");

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl<W: Write + Send> BiosemiTrigger<W> {
    /// Wrap an arbitrary byte sink
    pub fn from_writer(port: W, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
        }
    }

    /// Send a test pulse, reporting whether the interface accepted it
    pub fn probe(&mut self, code: u8) -> bool {
        match self.send(code) {
            Ok(()) => {
                info!(code, port = %self.name, "Trigger test pulse sent");
                true
            }
            Err(e) => {
                warn!(port = %self.name, error = %e, "Trigger connection test failed");
                false
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.port
    }
}

impl<W: Write + Send> TriggerPort for BiosemiTrigger<W> {
    fn send(&mut self, code: u8) -> HalResult<()> {
        if code == 0 {
            return Err(HalError::Configuration(
                "trigger code 0 drives no trigger line".to_string(),
            ));
        }
        self.port.write_all(&[code])?;
        self.port.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Biosemi trigger @ {}", self.name)
    }
}
