//! TUS-Stim: transcranial ultrasound stimulation control
//!
//! This library drives a stimulation session end to end:
//!
//! - Stimulation protocol model with derived burst timing
//! - Hardware abstraction layer for SCPI waveform generators, a simulator
//!   and the Biosemi EEG trigger interface
//! - Sham audio synthesis for auditory masking, WAV persistence and playback
//! - A protocol runner with an interruptible timing loop and TSV session log
//! - Layered TOML configuration
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tus_stim::hal::SimulatedAwg;
//! use tus_stim::protocol::{ProtocolParams, StimulationProtocol};
//! use tus_stim::runner::{ProtocolRunner, SessionLog};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let protocol = StimulationProtocol::new(ProtocolParams {
//!         duration_s: 2.0,
//!         mask_enabled: false,
//!         ..ProtocolParams::default()
//!     })?;
//!     let log = SessionLog::create("out".as_ref(), &serde_json::json!(protocol.params()))?;
//!
//!     let report = ProtocolRunner::new(protocol, SimulatedAwg::with_default_config(), log).run()?;
//!     println!("{} pulses, log at {}", report.pulses, report.log_path.display());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod audio;
pub mod config;
pub mod error;
pub mod hal;
pub mod protocol;
pub mod runner;
pub mod utils;

// Re-export commonly used types for convenience
pub use audio::{AudioMask, ShamAudioGenerator, ShamParams};
pub use config::{ConfigLoader, LabConfig};
pub use error::{TusError, TusResult};
pub use hal::{Awg, AwgFactory, AwgSession, DeviceSettings, HalError};
pub use protocol::{ProtocolParams, StimulationProtocol};
pub use runner::{ProtocolRunner, SessionOutcome, SessionReport, StopSignal};
pub use utils::time::TimeProvider;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
