// src/config/mod.rs
//! Laboratory configuration
//!
//! One TOML document configures both pipelines. Every section is optional;
//! missing values fall back to the constants in [`constants`].

pub mod constants;
pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

use crate::audio::{ReplicaParams, ShamParams};
use crate::hal::{ScpiConfig, TriggerConfig};
use crate::protocol::{ProtocolParams, StimulationProtocol};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete laboratory configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    #[serde(default)]
    pub protocol: ProtocolParams,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub awg: ScpiConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub sham: ShamParams,
    #[serde(default)]
    pub replica: ReplicaParams,
}

/// File system locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::assets_dir")]
    pub assets_dir: PathBuf,
    /// Relative to `assets_dir` unless absolute
    #[serde(default = "defaults::mask_file")]
    pub mask_file: PathBuf,
    #[serde(default = "defaults::log_dir")]
    pub log_dir: PathBuf,
}

mod defaults {
    use crate::config::constants::paths::*;
    use std::path::PathBuf;

    pub fn assets_dir() -> PathBuf {
        PathBuf::from(ASSETS_DIR)
    }

    pub fn mask_file() -> PathBuf {
        PathBuf::from(DEFAULT_MASK_FILE)
    }

    pub fn log_dir() -> PathBuf {
        PathBuf::from(DEFAULT_LOG_DIR)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            assets_dir: defaults::assets_dir(),
            mask_file: defaults::mask_file(),
            log_dir: defaults::log_dir(),
        }
    }
}

impl PathsConfig {
    /// Resolved location of the masking track
    pub fn mask_path(&self) -> PathBuf {
        if self.mask_file.is_absolute() {
            self.mask_file.clone()
        } else {
            self.assets_dir.join(&self.mask_file)
        }
    }
}

impl LabConfig {
    /// Validate every section, collecting all problems
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = StimulationProtocol::new(self.protocol.clone()) {
            errors.extend(e.violations.into_iter().map(|v| format!("protocol: {v}")));
        }
        if let Err(e) = self.awg.validate() {
            errors.push(format!("awg: {e}"));
        }
        if self.trigger.start_code == 0 || self.trigger.stop_code == 0 {
            errors.push("trigger: marker codes must be non-zero".to_string());
        }
        if self.trigger.start_code == self.trigger.stop_code {
            errors.push(format!(
                "trigger: start and stop codes must differ (both {})",
                self.trigger.start_code
            ));
        }
        if let Err(e) = self.sham.validate() {
            errors.push(format!("sham: {e}"));
        }
        if let Err(e) = self.replica.validate() {
            errors.push(format!("replica: {e}"));
        }
        if self.paths.log_dir.as_os_str().is_empty() {
            errors.push("paths: log_dir cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
