//! # objcache Core
//!
//! Core errors, traits, and configuration for the objcache idle-expiring object cache.
//!
//! This crate provides the building blocks shared by the other objcache crates:
//!
//! - **Errors**: A single error enum with context
//! - **Constants**: Timing constants and defaults
//! - **Traits**: The `Closable` release capability for cached values
//! - **Config**: Cache timing configuration from code, environment, or file
//!
//! ## Example
//!
//! ```rust
//! use objcache_core::{CacheConfig, CacheError};
//!
//! let config = CacheConfig::new(30, 5);
//! assert!(config.validate().is_ok());
//!
//! let bad = CacheConfig::new(30, 0);
//! assert!(matches!(bad.validate(), Err(CacheError::ConfigError(_))));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;

// Re-export commonly used items at crate root
pub use config::CacheConfig;
pub use constants::*;
pub use error::{CacheError, Result};
pub use traits::Closable;
