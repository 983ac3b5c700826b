//! Cache timing configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CLEAN_INTERVAL_SECONDS, DEFAULT_LIVE_SECONDS, ENV_CLEAN_INTERVAL_SECONDS,
    ENV_LIVE_SECONDS,
};
use crate::error::{CacheError, Result};

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Idle seconds before an entry is eligible for eviction
    pub live_seconds: u64,
    /// Seconds between background sweep passes
    pub clean_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            live_seconds: DEFAULT_LIVE_SECONDS,
            clean_interval_seconds: DEFAULT_CLEAN_INTERVAL_SECONDS,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration from live and sweep periods in seconds.
    pub fn new(live_seconds: u64, clean_interval_seconds: u64) -> Self {
        Self {
            live_seconds,
            clean_interval_seconds,
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// A `.env` file is read first if present. Missing variables fall back to
    /// the defaults; values that are not unsigned integers are rejected.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from a JSON file.
    ///
    /// Fields absent from the file keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(CacheError::IoError)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            live_seconds: parse_seconds(&lookup, ENV_LIVE_SECONDS, defaults.live_seconds)?,
            clean_interval_seconds: parse_seconds(
                &lookup,
                ENV_CLEAN_INTERVAL_SECONDS,
                defaults.clean_interval_seconds,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive a sweeper.
    ///
    /// A zero live duration is allowed (entries expire after the buffer alone);
    /// a zero clean interval is not.
    pub fn validate(&self) -> Result<()> {
        if self.clean_interval_seconds == 0 {
            return Err(CacheError::ConfigError(
                "clean interval must be at least one second".into(),
            ));
        }
        Ok(())
    }

    /// Idle threshold as a `Duration`.
    pub fn live_duration(&self) -> Duration {
        Duration::from_secs(self.live_seconds)
    }

    /// Sweep period as a `Duration`.
    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_seconds)
    }
}

fn parse_seconds<F>(lookup: &F, name: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            CacheError::ConfigError(format!("{name} must be a whole number of seconds: {e}"))
        }),
    }
}
