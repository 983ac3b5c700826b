//! Idle-expiring object cache.
//!
//! Memoizes expensive resources (connections, clients, computed objects)
//! behind a string key:
//!
//! - [`Cache`]: concurrent store whose background sweeper evicts entries left
//!   idle too long, closing [`Closable`] values on the way out
//! - [`CacheManager`]: adds get-or-create, running the factory at most once
//!   for concurrent misses
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use objcache::CacheManager;
//!
//! let manager = CacheManager::<Arc<String>>::new(300, 60)?;
//! let conn = manager.get_or_create("db-primary", || {
//!     Ok::<_, std::io::Error>(Arc::new("connected".to_string()))
//! })?;
//! assert_eq!(conn.as_str(), "connected");
//! manager.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod entry;
mod manager;
mod sweeper;

pub use cache::{Cache, CacheStats};
pub use manager::{CacheManager, ManagerStats};

pub use objcache_core::{CacheConfig, CacheError, Closable, Result, MIN_LIVE_BUFFER};
