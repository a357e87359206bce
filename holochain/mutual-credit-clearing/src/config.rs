//! Configuration for the mutual credit clearing conductor

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::validation::DEFAULT_USER_NAME_MAX_LENGTH;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mutual-credit-clearing")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for agent keys and shard databases
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep shards and agent keys on disk instead of in memory
    #[serde(default)]
    pub persist: bool,

    /// Instances to start, one agent each
    #[serde(default = "default_instances")]
    pub instances: Vec<String>,

    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Registration rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Longest accepted user name, in characters
    #[serde(default = "default_user_name_max_length")]
    pub user_name_max_length: usize,
}

fn default_instances() -> Vec<String> {
    vec!["amy".to_string(), "brad".to_string()]
}

fn default_user_name_max_length() -> usize {
    DEFAULT_USER_NAME_MAX_LENGTH
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            user_name_max_length: default_user_name_max_length(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: false,
            instances: default_instances(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.user_name_max_length == 0 {
            return Err(ConfigError::Invalid(
                "registry.user_name_max_length must be at least 1".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.instances {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("instance names cannot be empty".to_string()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!("duplicate instance: {}", name)));
            }
        }
        Ok(())
    }

    /// Path of an instance's agent key
    pub fn key_path(&self, instance: &str) -> PathBuf {
        self.data_dir.join("keys").join(format!("{}.key", instance))
    }

    /// Path of an instance's shard database
    pub fn shard_path(&self, instance: &str) -> PathBuf {
        self.data_dir.join("shards").join(format!("{}.sled", instance))
    }
}
