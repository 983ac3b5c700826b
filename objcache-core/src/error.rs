//! Error types for objcache.
//!
//! Cache reads and writes are infallible. Errors come from construction
//! (configuration, sweeper thread) and from `Closable` implementations,
//! whose failures the cache logs and swallows.

use thiserror::Error;

/// Result type alias using `CacheError`.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Main error type for all objcache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Invalid cache configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON config file could not be parsed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Config file I/O error.
    #[error("I/O error: {0}")]
    IoError(#[source] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// The background sweeper thread could not be started.
    #[error("Failed to spawn sweeper thread: {0}")]
    SpawnError(#[source] std::io::Error),

    /// Releasing an evicted value failed.
    #[error("Release failed: {reason}")]
    ReleaseFailed {
        /// Why the release operation failed
        reason: String,
    },
}

impl CacheError {
    /// Shorthand for a `ReleaseFailed` error.
    pub fn release(reason: impl Into<String>) -> Self {
        CacheError::ReleaseFailed {
            reason: reason.into(),
        }
    }

    /// Returns true if this error came from loading or validating configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CacheError::ConfigError(_) | CacheError::JsonError(_) | CacheError::IoError(_)
        )
    }
}
