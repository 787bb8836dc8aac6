// src/hal/mod.rs
//! Hardware Abstraction Layer for the waveform generator and trigger interface

pub mod traits;
pub mod types;
pub mod session;
pub mod simulator;
pub mod scpi_driver;
pub mod trigger;


pub use traits::*;
pub use types::*;
pub use session::AwgSession;
pub use scpi_driver::{AwgTransport, ScpiAwg, ScpiConfig};
pub use simulator::{CallJournal, SimulatedAwg, SimulatorConfig};
pub use trigger::{BiosemiTrigger, MarkerCodes, TriggerConfig};

/// Builds the AWG implementation selected for a session
pub struct AwgFactory;

impl AwgFactory {
    /// Connect to the instrument when `real` is set, otherwise build the simulator
    ///
    /// There is no silent fallback: an unreachable instrument is an error.
    pub fn create(real: bool, config: &ScpiConfig) -> HalResult<Box<dyn Awg>> {
        if real {
            Ok(Box::new(ScpiAwg::connect(config.clone())?))
        } else {
            Ok(Box::new(Self::create_simulator(config)))
        }
    }

    /// Simulator sharing the instrument's limits
    pub fn create_simulator(config: &ScpiConfig) -> SimulatedAwg {
        SimulatedAwg::new(SimulatorConfig {
            limits: config.limits.clone(),
        })
    }
}
