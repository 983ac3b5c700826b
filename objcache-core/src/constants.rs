//! Timing constants for objcache.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// EXPIRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Slack added to the live duration before an entry counts as expired.
///
/// Absorbs timer jitter so an entry touched just before the threshold is not
/// evicted by a sweep tick landing microseconds later.
pub const MIN_LIVE_BUFFER: Duration = Duration::from_millis(100);

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default idle time before an entry becomes eligible for eviction.
pub const DEFAULT_LIVE_SECONDS: u64 = 300;

/// Default period between sweep passes.
pub const DEFAULT_CLEAN_INTERVAL_SECONDS: u64 = 60;

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Environment variable overriding the live duration, in seconds.
pub const ENV_LIVE_SECONDS: &str = "OBJCACHE_LIVE_SECONDS";

/// Environment variable overriding the sweep period, in seconds.
pub const ENV_CLEAN_INTERVAL_SECONDS: &str = "OBJCACHE_CLEAN_INTERVAL_SECONDS";

/// Name given to each cache's background sweeper thread.
pub const SWEEPER_THREAD_NAME: &str = "objcache-sweeper";
