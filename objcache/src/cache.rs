//! Concurrent idle-expiring cache with a background sweeper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error};

use objcache_core::constants::SWEEPER_THREAD_NAME;
use objcache_core::error::{CacheError, Result};
use objcache_core::{CacheConfig, Closable};

use crate::entry::CacheEntry;
use crate::sweeper::{self, Shutdown};

type ReleaseFn<V> = fn(&V) -> Result<()>;

/// Running counters for a cache.
#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    deletions: AtomicU64,
    evictions: AtomicU64,
    release_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// State shared between a `Cache` handle and its sweeper thread.
struct Shared<V> {
    entries: DashMap<String, CacheEntry<V>>,
    live_duration: Duration,
    clean_interval: Duration,
    release: Option<ReleaseFn<V>>,
    shutdown: Shutdown,
    counters: Counters,
}

impl<V> Shared<V> {
    fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((key, entry)) => {
                Counters::bump(&self.counters.deletions, 1);
                self.release(&key, entry.into_value());
                true
            }
            None => false,
        }
    }

    fn purge_expired(&self) -> usize {
        let live = self.live_duration;
        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|item| item.value().expired(live))
            .map(|item| item.key().clone())
            .collect();

        let mut evicted = 0;
        for key in candidates {
            // Re-checked under the shard lock: a touch since the scan keeps the entry.
            if let Some((key, entry)) = self.entries.remove_if(&key, |_, entry| entry.expired(live)) {
                self.release(&key, entry.into_value());
                evicted += 1;
            }
        }

        if evicted > 0 {
            Counters::bump(&self.counters.evictions, evicted as u64);
            debug!(evicted, remaining = self.entries.len(), "Swept idle entries");
        }
        evicted
    }

    fn release(&self, key: &str, value: V) {
        let Some(release) = self.release else {
            return;
        };
        if let Err(err) = release(&value) {
            Counters::bump(&self.counters.release_failures, 1);
            error!(key, error = %err, "Error closing cache item");
        }
    }
}

/// Thread-safe cache whose entries expire after sitting idle.
///
/// Every cache owns one background thread that sweeps idle entries each
/// `clean_interval`. An entry is idle once it has not been read or written
/// for longer than `live_duration` plus [`MIN_LIVE_BUFFER`](objcache_core::MIN_LIVE_BUFFER).
///
/// Reads never check expiry: an idle entry the sweeper has not reached yet is
/// still returned, and the read refreshes it.
///
/// # Release hook
///
/// Caches built with a `*_closable` constructor call [`Closable::close`] once on
/// every value removed by [`delete`](Cache::delete), [`clear`](Cache::clear) or
/// the sweeper. Failures are logged and counted, never returned. Values replaced
/// by [`set`](Cache::set) are dropped without being closed.
///
/// # Shutdown
///
/// [`close`](Cache::close) stops the sweeper; the cache keeps serving reads and
/// writes. Dropping the cache closes it. Values still cached at that point are
/// dropped without release.
pub struct Cache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache from live and sweep periods in seconds.
    ///
    /// Removed values are dropped without being closed, even if they implement
    /// [`Closable`]. Use [`new_closable`](Cache::new_closable) for resources
    /// that need releasing:
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use objcache::{Cache, Closable, Result};
    ///
    /// struct Conn;
    ///
    /// impl Closable for Conn {
    ///     fn close(&self) -> Result<()> {
    ///         Ok(())
    ///     }
    /// }
    ///
    /// let plain = Cache::<Arc<Conn>>::new(30, 5)?; // delete drops `Conn` silently
    /// let closing = Cache::<Arc<Conn>>::new_closable(30, 5)?; // delete calls `Conn::close`
    /// # plain.close();
    /// # closing.close();
    /// # Ok::<(), objcache::CacheError>(())
    /// ```
    pub fn new(live_seconds: u64, clean_interval_seconds: u64) -> Result<Self> {
        Self::with_config(&CacheConfig::new(live_seconds, clean_interval_seconds))
    }

    /// Creates a cache from a validated configuration.
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::with_durations(config.live_duration(), config.clean_interval())
    }

    /// Creates a cache with sub-second precision.
    pub fn with_durations(live_duration: Duration, clean_interval: Duration) -> Result<Self> {
        Self::start(live_duration, clean_interval, None)
    }

    fn start(
        live_duration: Duration,
        clean_interval: Duration,
        release: Option<ReleaseFn<V>>,
    ) -> Result<Self> {
        if clean_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "clean interval must be positive".into(),
            ));
        }

        let shared = Arc::new(Shared {
            entries: DashMap::new(),
            live_duration,
            clean_interval,
            release,
            shutdown: Shutdown::new(),
            counters: Counters::default(),
        });

        let sweeper_state = shared.clone();
        thread::Builder::new()
            .name(SWEEPER_THREAD_NAME.into())
            .spawn(move || {
                let state = sweeper_state;
                sweeper::run(&state.shutdown, state.clean_interval, || {
                    state.purge_expired();
                });
            })
            .map_err(CacheError::SpawnError)?;

        debug!(
            live_ms = live_duration.as_millis() as u64,
            clean_ms = clean_interval.as_millis() as u64,
            closable = shared.release.is_some(),
            "Cache started"
        );
        Ok(Self { shared })
    }
}

impl<V> Cache<V>
where
    V: Closable + Clone + Send + Sync + 'static,
{
    /// Like [`new`](Cache::new), closing values when they are removed.
    pub fn new_closable(live_seconds: u64, clean_interval_seconds: u64) -> Result<Self> {
        Self::with_config_closable(&CacheConfig::new(live_seconds, clean_interval_seconds))
    }

    /// Like [`with_config`](Cache::with_config), closing values when they are removed.
    pub fn with_config_closable(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::with_durations_closable(config.live_duration(), config.clean_interval())
    }

    /// Like [`with_durations`](Cache::with_durations), closing values when they are removed.
    pub fn with_durations_closable(live_duration: Duration, clean_interval: Duration) -> Result<Self> {
        let release: ReleaseFn<V> = <V as Closable>::close;
        Self::start(live_duration, clean_interval, Some(release))
    }
}

impl<V: Clone> Cache<V> {
    /// Gets a cached value and refreshes its idle clock.
    pub fn get(&self, key: &str) -> Option<V> {
        let counters = &self.shared.counters;
        match self.lookup(key) {
            Some(value) => {
                Counters::bump(&counters.hits, 1);
                Some(value)
            }
            None => {
                Counters::bump(&counters.misses, 1);
                None
            }
        }
    }

    /// Touching lookup that leaves the hit/miss counters alone.
    pub(crate) fn lookup(&self, key: &str) -> Option<V> {
        self.shared.entries.get(key).map(|item| {
            let entry = item.value();
            entry.touch();
            entry.get().clone()
        })
    }
}

impl<V> Cache<V> {
    /// Inserts or replaces the value for `key`.
    ///
    /// A replaced value is dropped without being closed.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.shared.entries.insert(key.into(), CacheEntry::new(value));
        Counters::bump(&self.shared.counters.inserts, 1);
    }

    /// Removes `key`, closing its value if this cache releases values.
    ///
    /// Deleting a missing key does nothing.
    pub fn delete(&self, key: &str) {
        self.shared.remove(key);
    }

    /// Removes every entry through the release path.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let keys: Vec<String> = self.shared.entries.iter().map(|item| item.key().clone()).collect();
        keys.iter().filter(|key| self.shared.remove(key)).count()
    }

    /// Runs one sweep pass now, independent of the background schedule.
    ///
    /// Returns the number of entries evicted.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Returns true if `key` is cached, without refreshing it.
    pub fn contains_key(&self, key: &str) -> bool {
        self.shared.entries.contains_key(key)
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Idle threshold, excluding the expiry buffer.
    pub fn live_duration(&self) -> Duration {
        self.shared.live_duration
    }

    /// Period between sweep passes.
    pub fn clean_interval(&self) -> Duration {
        self.shared.clean_interval
    }

    /// Stops the background sweeper. Safe to call more than once.
    ///
    /// Returns immediately; a sweep pass already running is allowed to finish.
    pub fn close(&self) {
        if self.shared.shutdown.trigger() {
            debug!(remaining = self.shared.entries.len(), "Cache closed");
        }
    }

    /// Returns true once [`close`](Cache::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_triggered()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let counters = &self.shared.counters;
        CacheStats {
            entries: self.shared.entries.len(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            inserts: counters.inserts.load(Ordering::Relaxed),
            deletions: counters.deletions.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            release_failures: counters.release_failures.load(Ordering::Relaxed),
        }
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently cached
    pub entries: usize,
    /// Lookups that found a value
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Calls to `set`, including overwrites
    pub inserts: u64,
    /// Entries removed by `delete` or `clear`
    pub deletions: u64,
    /// Entries removed by the sweeper or `purge_expired`
    pub evictions: u64,
    /// Release hooks that returned an error
    pub release_failures: u64,
}
