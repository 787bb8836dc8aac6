// src/error.rs
//! Crate-level error type
//!
//! Module errors convert into [`TusError`]; the binaries turn it into a
//! process exit code with [`TusError::exit_code`].

use crate::audio::AudioError;
use crate::config::ConfigError;
use crate::hal::HalError;
use crate::protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TusError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TusResult<T> = Result<T, TusError>;

/// Process exit codes
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const CONNECTION: i32 = 3;
}

impl TusError {
    /// Whether the error was caused by bad parameters rather than a fault
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TusError::Protocol(_)
                | TusError::Config(_)
                | TusError::Hal(HalError::Configuration(_))
                | TusError::Audio(AudioError::MissingFile(_))
                | TusError::Audio(AudioError::InvalidParameters(_))
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            exit_code::CONFIGURATION
        } else if matches!(self, TusError::Hal(HalError::Connection { .. })) {
            exit_code::CONNECTION
        } else {
            exit_code::FAILURE
        }
    }
}
