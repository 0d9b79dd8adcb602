//! Engine configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Data-model engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of runtime-dynamic endpoint slots after the fixed table
    #[serde(default = "default_dynamic_endpoints")]
    pub max_dynamic_endpoints: usize,
    /// Largest attribute the stack's transfer buffer can carry; dynamic
    /// endpoint registration rejects anything bigger
    #[serde(default = "default_transfer_buffer")]
    pub transfer_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_dynamic_endpoints: default_dynamic_endpoints(),
            transfer_buffer_size: default_transfer_buffer(),
        }
    }
}

fn default_dynamic_endpoints() -> usize {
    4
}

fn default_transfer_buffer() -> usize {
    256
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Engine configuration not found, using defaults"
        );
        Ok(EngineConfig::default())
    }
}
