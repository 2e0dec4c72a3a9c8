//! Engine configuration: settle delays and retry limits. Loaded from a YAML
//! file when one exists, falling back to built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay before re-extracting after a pagination interaction, in
    /// milliseconds. Selectors may override it per relation.
    pub settle_delay_ms: u64,
    /// How many times to re-poll a page that yields no relation before
    /// giving up on synthesis.
    pub max_likely_relation_attempts: u32,
    /// Pause between those polls, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            max_likely_relation_attempts: 10,
            retry_backoff_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the first config found: `./relfind.yaml`, then
    /// `~/.relfind/config.yaml`, then built-in defaults.
    pub async fn load_default() -> Result<EngineConfig, ConfigError> {
        let local = PathBuf::from("relfind.yaml");
        if local.exists() {
            return Self::load_from(&local).await;
        }
        if let Some(home) = dirs::home_dir() {
            let user = home.join(".relfind").join("config.yaml");
            if user.exists() {
                return Self::load_from(&user).await;
            }
        }
        Ok(EngineConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<EngineConfig, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}
