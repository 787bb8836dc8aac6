// src/config/loader.rs
//! Layered configuration loader
//!
//! Precedence, lowest first: built-in defaults, discovered files
//! (`tus.toml`, `config/tus.toml`), an explicitly requested file, then
//! `TUS_*` environment variables.

use crate::config::{constants::paths, LabConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("configuration parse error: {0}")]
    Parse(String),

    #[error("configuration validation errors:\n  {}", .0.join("\n  "))]
    Validation(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    explicit: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Loader over the default discovery paths
    pub fn new() -> Self {
        Self::with_paths(vec![
            PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ])
    }

    /// Loader over custom optional paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            explicit: None,
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    /// Require `path`, layered above the discovered files
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Merge all layers, deserialize and validate
    pub fn load(&self) -> Result<LabConfig, ConfigError> {
        let mut merged = toml::Value::try_from(LabConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        for path in &self.config_paths {
            if path.exists() {
                debug!(path = %path.display(), "Merging configuration file");
                merge_toml_values(&mut merged, Self::load_file(path)?);
            }
        }
        if let Some(path) = &self.explicit {
            merge_toml_values(&mut merged, Self::load_file(path)?);
            info!(path = %path.display(), "Configuration loaded");
        }

        self.apply_environment_overrides(&mut merged, std::env::vars());

        let config: LabConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Parse one TOML file
    pub fn load_file(path: &Path) -> Result<toml::Value, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write `config` as TOML
    pub fn export_config(config: &LabConfig, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `TUS_PROTOCOL_PRF_HZ=10` sets `protocol.prf_hz`. The first segment
    /// names the section; `__` descends further (`TUS_AWG_LIMITS__MAX_AMPLITUDE_VPP`).
    fn apply_environment_overrides(
        &self,
        config: &mut toml::Value,
        vars: impl Iterator<Item = (String, String)>,
    ) {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&self.env_prefix) else {
                continue;
            };
            let Some((section, field)) = rest.split_once('_') else {
                continue;
            };
            let mut path = vec![section.to_lowercase()];
            path.extend(field.split("__").map(str::to_lowercase));
            debug!(variable = %key, "Environment override");
            set_nested_value(config, &path, parse_env_value(&value));
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn set_nested_value(config: &mut toml::Value, path: &[String], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = config;
    for part in parents {
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(part.clone())
            .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
    }
    if let toml::Value::Table(table) = current {
        table.insert(last.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_discovery() -> ConfigLoader {
        ConfigLoader::with_paths(Vec::new()).with_env_prefix("TUS_LOADER_TEST_")
    }

    #[test]
    fn test_default_discovery_paths() {
        let loader = ConfigLoader::new();
        assert_eq!(loader.config_paths().len(), 2);
    }

    #[test]
    fn test_load_defaults_without_files() {
        let config = no_discovery().load().unwrap();
        assert_eq!(config, LabConfig::default());
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[protocol]
prf_hz = 10.0
duration_s = 20

[paths]
log_dir = "sessions"
"#
        )
        .unwrap();

        let config = no_discovery().with_file(file.path()).load().unwrap();
        assert_eq!(config.protocol.prf_hz, 10.0);
        assert_eq!(config.protocol.duration_s, 20.0);
        assert_eq!(config.paths.log_dir, PathBuf::from("sessions"));
        assert_eq!(config.protocol.vpp_mv, LabConfig::default().protocol.vpp_mv);
    }

    #[test]
    fn test_later_files_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        std::fs::write(&first, "[protocol]\nprf_hz = 2.0\nduty_cycle = 0.2\n").unwrap();
        std::fs::write(&second, "[protocol]\nprf_hz = 4.0\n").unwrap();

        let config = ConfigLoader::with_paths(vec![first, second, dir.path().join("missing.toml")])
            .with_env_prefix("TUS_LOADER_TEST_")
            .load()
            .unwrap();
        assert_eq!(config.protocol.prf_hz, 4.0);
        assert_eq!(config.protocol.duty_cycle, 0.2);
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = no_discovery().with_file("/nonexistent/tus.toml").load().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[protocol]\nprf_hz = -1.0\nduty_cycle = 3.0").unwrap();

        match no_discovery().with_file(file.path()).load() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[protocol\nprf_hz = ").unwrap();
        let err = no_discovery().with_file(file.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_override_paths_from_variables() {
        let loader = no_discovery();
        let mut value = toml::Value::try_from(LabConfig::default()).unwrap();
        let vars = vec![
            ("TUS_LOADER_TEST_PROTOCOL_PRF_HZ".to_string(), "8".to_string()),
            (
                "TUS_LOADER_TEST_AWG_LIMITS__MAX_AMPLITUDE_VPP".to_string(),
                "2.5".to_string(),
            ),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        loader.apply_environment_overrides(&mut value, vars.into_iter());

        let config: LabConfig = value.try_into().unwrap();
        assert_eq!(config.protocol.prf_hz, 8.0);
        assert_eq!(config.awg.limits.max_amplitude_vpp, 2.5);
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        std::env::set_var("TUS_ENVTEST_PROTOCOL_DURATION_S", "12");
        std::env::set_var("TUS_ENVTEST_PROTOCOL_MASK_ENABLED", "false");

        let config = ConfigLoader::with_paths(Vec::new())
            .with_env_prefix("TUS_ENVTEST_")
            .load()
            .unwrap();

        std::env::remove_var("TUS_ENVTEST_PROTOCOL_DURATION_S");
        std::env::remove_var("TUS_ENVTEST_PROTOCOL_MASK_ENABLED");

        assert_eq!(config.protocol.duration_s, 12.0);
        assert!(!config.protocol.mask_enabled);
    }

    #[test]
    fn test_config_export_round_trips() {
        let file = NamedTempFile::new().unwrap();
        let mut config = LabConfig::default();
        config.protocol.prf_hz = 7.5;
        ConfigLoader::export_config(&config, file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("[protocol]"));
        let back = no_discovery().with_file(file.path()).load().unwrap();
        assert_eq!(back.protocol.prf_hz, 7.5);
    }
}
