// src/hal/session.rs
//! Scoped AWG session
//!
//! The session owns the instrument for its whole lifetime. Closing is
//! guaranteed: if the session is dropped without an explicit [`close`],
//! the output is forced off and the instrument released on drop.
//!
//! [`close`]: AwgSession::close

use crate::hal::{Awg, DeviceSettings, DeviceType, HalError, HalResult};
use tracing::{info, warn};

pub struct AwgSession<A: Awg> {
    awg: A,
    output_on: bool,
    closed: bool,
}

impl<A: Awg> AwgSession<A> {
    pub fn open(awg: A) -> Self {
        info!(device = %awg.describe(), "AWG session opened");
        Self {
            awg,
            output_on: false,
            closed: false,
        }
    }

    pub fn configure(&mut self, settings: &DeviceSettings) -> HalResult<()> {
        self.ensure_open()?;
        self.awg.configure(settings)
    }

    pub fn set_output(&mut self, on: bool) -> HalResult<()> {
        self.ensure_open()?;
        self.awg.set_output(on)?;
        self.output_on = on;
        Ok(())
    }

    pub fn is_output_on(&self) -> bool {
        self.output_on
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn device_type(&self) -> DeviceType {
        self.awg.device_type()
    }

    pub fn describe(&self) -> String {
        self.awg.describe()
    }

    /// Release the instrument
    ///
    /// The session counts as closed even if the device reports an error, so
    /// drop will not try a second time.
    pub fn close(&mut self) -> HalResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.output_on = false;
        let result = self.awg.close();
        info!(device = %self.awg.describe(), "AWG session closed");
        result
    }

    fn ensure_open(&self) -> HalResult<()> {
        if self.closed {
            Err(HalError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<A: Awg> Drop for AwgSession<A> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!("AWG session dropped while open; forcing output off");
        if let Err(e) = self.awg.set_output(false) {
            warn!(error = %e, "failed to turn AWG output off");
        }
        self.closed = true;
        if let Err(e) = self.awg.close() {
            warn!(error = %e, "failed to close AWG");
        }
    }
}
