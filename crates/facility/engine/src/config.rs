//! Engine configuration.
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! its default.
//!
//! ```toml
//! [reallocation]
//! excess_order = "newest_first"
//!
//! [locks]
//! acquire_timeout_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for the custody engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity reallocation policy.
    pub reallocation: ReallocationConfig,

    /// Lock acquisition behavior.
    pub locks: LockConfig,
}

impl EngineConfig {
    /// Parse configuration from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check values serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.locks.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "locks.acquire_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which occupants leave a cell whose capacity shrinks below its occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcessOrder {
    /// Most recently placed occupants move first; the longest-housed stay.
    #[default]
    NewestFirst,

    /// Longest-housed occupants move first.
    OldestFirst,
}

/// Capacity reallocation policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReallocationConfig {
    pub excess_order: ExcessOrder,
}

/// Lock acquisition behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Upper bound on waiting for a block, occupant, firearm, holder or
    /// supervision lock before the operation fails with `LockTimeout`.
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 5_000,
        }
    }
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
