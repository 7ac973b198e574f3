use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{face::MAX_PACKET_SIZE, pit::DEFAULT_INTEREST_LIFETIME_MS, strategy::StrategyKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Forwarder settings. Keys missing from a config file keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Lifetime of Interests that do not carry one.
    pub default_interest_lifetime_ms: u64,
    /// Zero disables the content store.
    pub content_store_capacity: usize,
    /// Largest encoded packet a face accepts for sending.
    pub max_packet_size: usize,
    /// Strategy bound to the root namespace.
    pub default_strategy: StrategyKind,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            default_interest_lifetime_ms: DEFAULT_INTEREST_LIFETIME_MS,
            content_store_capacity: 1000,
            max_packet_size: MAX_PACKET_SIZE,
            default_strategy: StrategyKind::BestRoute,
        }
    }
}

impl ForwarderConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads the config at `path`, falling back to the defaults if there is no file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
