//! Simulator configuration.
//!
//! Read from a JSON file, then overridden by `JUICE_PARAMS`, `JUICE_DATA_DIR`
//! and `JUICE_LOG`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::output::OutputFormat;
use crate::core::config::ProtocolParams;
use crate::utils::constants::PPM_DIVISOR;

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATOR CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration of the `juice` simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Protocol parameter file; defaults apply when absent
    pub params_path: Option<PathBuf>,
    /// Directory holding persisted engine snapshots
    pub data_dir: PathBuf,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Leading rate at genesis
    pub leadrate_ppm: u32,
    /// Output format
    pub format: OutputFormat,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            params_path: None,
            data_dir: default_data_dir(),
            log_level: "info".into(),
            leadrate_ppm: 50_000,
            format: OutputFormat::Text,
        }
    }
}

impl SimulatorConfig {
    /// Load from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overridden from the environment
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of this configuration
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = std::env::var("JUICE_PARAMS") {
            self.params_path = Some(PathBuf::from(path));
        }
        if let Ok(dir) = std::env::var("JUICE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("JUICE_LOG") {
            self.log_level = level;
        }
        self
    }

    /// Protocol parameters from `params_path`, or the defaults
    pub fn protocol_params(&self) -> Result<ProtocolParams, ConfigError> {
        match &self.params_path {
            Some(path) => Ok(ProtocolParams::load(path)?),
            None => Ok(ProtocolParams::default()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Validation("log level cannot be empty".into()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("data directory cannot be empty".into()));
        }
        if self.leadrate_ppm as u128 >= PPM_DIVISOR {
            return Err(ConfigError::Validation(format!(
                "leading rate {} ppm is not below 100%",
                self.leadrate_ppm
            )));
        }
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.json")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Protocol parameters rejected
    #[error("Invalid protocol parameters: {0}")]
    Params(#[from] crate::error::Error),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

fn default_data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".juice"),
        Err(_) => PathBuf::from(".juice"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SimulatorConfig::default();
        assert_eq!(config.leadrate_ppm, 50_000);
        assert!(config.params_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimulatorConfig::default();
        config.log_level = " ".into();
        assert!(config.validate().is_err());

        let mut config = SimulatorConfig::default();
        config.leadrate_ppm = 1_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = SimulatorConfig {
            data_dir: dir.path().join("data"),
            leadrate_ppm: 30_000,
            format: OutputFormat::Json,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SimulatorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"leadrate_ppm": 20000}"#).unwrap();
        let config = SimulatorConfig::load(&path).unwrap();
        assert_eq!(config.leadrate_ppm, 20_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_params_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let params = ProtocolParams::default().with_opening_fee(0);
        params.save(&path).unwrap();

        let config = SimulatorConfig {
            params_path: Some(path),
            ..Default::default()
        };
        assert_eq!(config.protocol_params().unwrap().opening_fee, 0);
        assert!(SimulatorConfig::default().protocol_params().is_ok());
    }
}
