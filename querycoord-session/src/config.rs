use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Session layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub liveness: LivenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Heartbeat-based liveness checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Interval between liveness checks
    pub check_interval_secs: u64,
    /// Heartbeat age after which a node is marked as stopping
    pub heartbeat_timeout_secs: u64,
    /// Heartbeat age after which a node is removed, disabled if unset
    pub removal_timeout_secs: Option<u64>,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            heartbeat_timeout_secs: 30,
            removal_timeout_secs: None,
        }
    }
}

impl LivenessConfig {
    /// Reject settings the liveness monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "liveness.check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "liveness.heartbeat_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some(removal) = self.removal_timeout_secs {
            if removal <= self.heartbeat_timeout_secs {
                return Err(Error::InvalidConfig(format!(
                    "liveness.removal_timeout_secs ({removal}) must exceed heartbeat_timeout_secs ({})",
                    self.heartbeat_timeout_secs
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // QUERYCOORD_LIVENESS__HEARTBEAT_TIMEOUT_SECS etc.
        builder = builder.add_source(
            Environment::with_prefix("QUERYCOORD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.liveness.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }
}
