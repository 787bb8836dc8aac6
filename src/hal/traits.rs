// src/hal/traits.rs
//! Core HAL traits for instrument abstraction

use crate::hal::types::{DeviceSettings, DeviceType, HalResult};

/// Capability set of an arbitrary waveform generator
///
/// Real instruments and the simulator both satisfy this role; which one is
/// used is decided when the session is built.
pub trait Awg: Send {
    /// Push device-level settings; rejects out-of-range values
    fn configure(&mut self, settings: &DeviceSettings) -> HalResult<()>;

    /// Gate the stimulation output
    fn set_output(&mut self, on: bool) -> HalResult<()>;

    /// Release the connection. Called once, after the output is off.
    fn close(&mut self) -> HalResult<()>;

    fn device_type(&self) -> DeviceType;

    /// Human readable identity for logs
    fn describe(&self) -> String;
}

impl<A: Awg + ?Sized> Awg for Box<A> {
    fn configure(&mut self, settings: &DeviceSettings) -> HalResult<()> {
        (**self).configure(settings)
    }

    fn set_output(&mut self, on: bool) -> HalResult<()> {
        (**self).set_output(on)
    }

    fn close(&mut self) -> HalResult<()> {
        (**self).close()
    }

    fn device_type(&self) -> DeviceType {
        (**self).device_type()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Fire-and-forget marker output to an EEG amplifier
pub trait TriggerPort: Send {
    fn send(&mut self, code: u8) -> HalResult<()>;

    fn describe(&self) -> String;
}
