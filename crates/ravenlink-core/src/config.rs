//! Pipeline configuration loaded from JSON.
//!
//! Every field has a default, so an empty object (`{}`) is a valid file.
//! Unknown keys are rejected to catch typos early.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::{DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, DrainPolicy};

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
/// The RAVEn stick talks 115200 8N1.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_DESTINATION: &str = "power_demand";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub device: String,
    pub baud_rate: u32,
    pub batch_size: usize,
    pub destination: String,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            batch_size: 1,
            destination: DEFAULT_DESTINATION.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_polls == 0 {
            return Err(ConfigError::Invalid(
                "max_polls must be at least 1".to_string(),
            ));
        }
        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("device must not be empty".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "destination must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_polls: self.max_polls,
        }
    }
}
