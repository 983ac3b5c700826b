//! Get-or-create on top of [`Cache`], with single-flight construction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, instrument};

use objcache_core::error::Result;
use objcache_core::{CacheConfig, Closable};

use crate::cache::{Cache, CacheStats};

/// Cache manager that builds missing values through a factory.
///
/// Concurrent [`get_or_create`](CacheManager::get_or_create) calls that miss
/// on the same key run the factory once; every caller receives the value it
/// produced.
///
/// # Creation lock
///
/// One lock serializes construction for all keys. While a factory runs, misses
/// on any other key wait behind it. Hits never take the lock, and direct
/// [`cache`](CacheManager::cache) access is unaffected.
pub struct CacheManager<V> {
    cache: Cache<V>,
    create_lock: Mutex<()>,
    factory_calls: AtomicU64,
    factory_failures: AtomicU64,
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a manager from live and sweep periods in seconds.
    ///
    /// Values are never closed on removal; see [`Cache::new`] and use
    /// [`new_closable`](CacheManager::new_closable) for resources.
    pub fn new(live_seconds: u64, clean_interval_seconds: u64) -> Result<Self> {
        Cache::new(live_seconds, clean_interval_seconds).map(Self::from_cache)
    }

    /// Creates a manager from a validated configuration.
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        Cache::with_config(config).map(Self::from_cache)
    }

    /// Creates a manager with sub-second precision.
    pub fn with_durations(live_duration: Duration, clean_interval: Duration) -> Result<Self> {
        Cache::with_durations(live_duration, clean_interval).map(Self::from_cache)
    }
}

impl<V> CacheManager<V>
where
    V: Closable + Clone + Send + Sync + 'static,
{
    /// Like [`new`](CacheManager::new), closing values when they are removed.
    pub fn new_closable(live_seconds: u64, clean_interval_seconds: u64) -> Result<Self> {
        Cache::new_closable(live_seconds, clean_interval_seconds).map(Self::from_cache)
    }

    /// Like [`with_config`](CacheManager::with_config), closing values when they are removed.
    pub fn with_config_closable(config: &CacheConfig) -> Result<Self> {
        Cache::with_config_closable(config).map(Self::from_cache)
    }

    /// Like [`with_durations`](CacheManager::with_durations), closing values when they are removed.
    pub fn with_durations_closable(live_duration: Duration, clean_interval: Duration) -> Result<Self> {
        Cache::with_durations_closable(live_duration, clean_interval).map(Self::from_cache)
    }
}

impl<V> CacheManager<V> {
    fn from_cache(cache: Cache<V>) -> Self {
        Self {
            cache,
            create_lock: Mutex::new(()),
            factory_calls: AtomicU64::new(0),
            factory_failures: AtomicU64::new(0),
        }
    }

    /// The underlying cache, for direct get/set/delete.
    pub fn cache(&self) -> &Cache<V> {
        &self.cache
    }

    /// Stops the underlying cache's sweeper. Safe to call more than once.
    pub fn close(&self) {
        self.cache.close();
    }

    /// Returns manager statistics.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            cache: self.cache.stats(),
            factory_calls: self.factory_calls.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> CacheManager<V> {
    /// Returns the cached value for `key`, building it with `factory` on a miss.
    ///
    /// The factory runs under the creation lock and only if the key is still
    /// missing once the lock is held. A factory error is returned as is and
    /// nothing is cached, so the next call runs the factory again.
    ///
    /// No timeout is applied: a factory that never returns holds the creation
    /// lock forever.
    #[instrument(level = "debug", skip(self, factory))]
    pub fn get_or_create<F, E>(&self, key: &str, factory: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(value) = self.cache.get(key) {
            return Ok(value);
        }

        let _guard = self.create_lock.lock();

        if let Some(value) = self.cache.lookup(key) {
            debug!("Value built by a concurrent caller");
            return Ok(value);
        }

        self.factory_calls.fetch_add(1, Ordering::Relaxed);
        match factory() {
            Ok(value) => {
                self.cache.set(key, value.clone());
                debug!("Cached new value");
                Ok(value)
            }
            Err(err) => {
                self.factory_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Factory failed, nothing cached");
                Err(err)
            }
        }
    }
}

/// Manager statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    /// Statistics of the underlying cache
    pub cache: CacheStats,
    /// Factory invocations
    pub factory_calls: u64,
    /// Factory invocations that returned an error
    pub factory_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Instant;

    use objcache_core::CacheError;

    struct MockObj {
        val: String,
        closed: AtomicUsize,
    }

    impl MockObj {
        fn new(val: &str) -> Arc<Self> {
            Arc::new(Self {
                val: val.to_string(),
                closed: AtomicUsize::new(0),
            })
        }
    }

    impl Closable for MockObj {
        fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug, PartialEq)]
    struct MockFailure;

    #[test]
    fn test_get_or_create_basic() {
        let mgr = CacheManager::<Arc<MockObj>>::new_closable(5, 1).unwrap();
        let calls = AtomicUsize::new(0);
        let factory = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, MockFailure>(MockObj::new("hello"))
        };

        let obj1 = mgr.get_or_create("a", factory).unwrap();
        assert_eq!(obj1.val, "hello");

        let obj2 = mgr.get_or_create("a", factory).unwrap();
        assert!(Arc::ptr_eq(&obj1, &obj2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_build() {
        let mgr = CacheManager::<Arc<MockObj>>::new_closable(10, 2).unwrap();
        let calls = AtomicUsize::new(0);
        const CALLERS: usize = 50;

        let results: Vec<Arc<MockObj>> = thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    s.spawn(|| {
                        mgr.get_or_create("shared", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(100));
                            Ok::<_, MockFailure>(MockObj::new("shared-object"))
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = &results[0];
        assert!(results.iter().all(|obj| Arc::ptr_eq(obj, first)));
        assert_eq!(mgr.stats().factory_calls, 1);
    }

    #[test]
    fn test_factory_error_not_cached() {
        let mgr = CacheManager::<u32>::new(5, 1).unwrap();
        let calls = AtomicUsize::new(0);
        let factory = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::ConfigError("mock failure".into()))
        };

        for attempt in 1..=3 {
            let err = mgr.get_or_create("err-key", factory).unwrap_err();
            assert_eq!(err.to_string(), "Configuration error: mock failure");
            assert_eq!(calls.load(Ordering::SeqCst), attempt);
        }

        assert!(!mgr.cache().contains_key("err-key"));
        assert_eq!(mgr.stats().factory_failures, 3);
    }

    #[test]
    fn test_retry_after_failure_caches_success() {
        let mgr = CacheManager::<u32>::new(5, 1).unwrap();
        assert_eq!(mgr.get_or_create("k", || Err(MockFailure)), Err(MockFailure));
        assert_eq!(mgr.get_or_create("k", || Ok::<_, MockFailure>(7)), Ok(7));
        assert_eq!(mgr.get_or_create("k", || Err(MockFailure)), Ok(7));
    }

    #[test]
    fn test_distinct_keys_build_separately() {
        let mgr = CacheManager::<String>::with_durations(Duration::from_secs(60), Duration::from_secs(60)).unwrap();
        let calls = AtomicUsize::new(0);

        thread::scope(|s| {
            for i in 0..8 {
                let (mgr, calls) = (&mgr, &calls);
                s.spawn(move || {
                    let key = format!("key{}", i % 4);
                    let built = mgr
                        .get_or_create(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, MockFailure>(format!("value-for-{key}"))
                        })
                        .unwrap();
                    assert_eq!(built, format!("value-for-{key}"));
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(mgr.cache().len(), 4);
    }

    #[test]
    fn test_unrelated_key_not_blocked_by_slow_factory() {
        let mgr = CacheManager::<Arc<MockObj>>::with_durations_closable(
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .unwrap();
        mgr.cache().set("b", MockObj::new("b"));

        let (started_tx, started_rx) = mpsc::channel();
        let mgr = &mgr;
        thread::scope(|s| {
            s.spawn(move || {
                mgr.get_or_create("a", || {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(500));
                    Ok::<_, MockFailure>(MockObj::new("a"))
                })
                .unwrap();
            });

            started_rx.recv().unwrap();
            let begin = Instant::now();
            assert_eq!(mgr.get_or_create("b", || Err(MockFailure)).unwrap().val, "b");
            assert_eq!(mgr.cache().get("b").unwrap().val, "b");
            mgr.cache().set("b2", MockObj::new("b2"));
            mgr.cache().delete("b");
            assert!(begin.elapsed() < Duration::from_millis(250));
        });

        assert!(mgr.cache().contains_key("a"));
        assert!(!mgr.cache().contains_key("b"));
    }

    #[test]
    fn test_panicking_factory_releases_lock() {
        let mgr = CacheManager::<u32>::new(5, 1).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = mgr.get_or_create("k", || -> std::result::Result<u32, MockFailure> {
                panic!("factory blew up")
            });
        }));
        assert!(outcome.is_err());

        assert_eq!(mgr.get_or_create("k", || Ok::<_, MockFailure>(1)), Ok(1));
    }

    #[test]
    fn test_build_counts_one_miss() {
        let mgr = CacheManager::<u32>::new(5, 1).unwrap();
        mgr.get_or_create("k", || Ok::<_, MockFailure>(1)).unwrap();
        mgr.get_or_create("k", || Ok::<_, MockFailure>(2)).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.cache.misses, 1);
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.factory_calls, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mgr = CacheManager::<u32>::new(1, 1).unwrap();
        mgr.close();
        mgr.close();
        assert!(mgr.cache().is_closed());
    }

    #[test]
    fn test_delete_releases_created_value() {
        let mgr = CacheManager::<Arc<MockObj>>::new_closable(5, 1).unwrap();
        let obj = mgr
            .get_or_create("conn", || Ok::<_, MockFailure>(MockObj::new("conn")))
            .unwrap();

        mgr.cache().delete("conn");
        mgr.cache().delete("conn");
        assert_eq!(obj.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_constructor() {
        let mgr = CacheManager::<u32>::with_config(&CacheConfig::new(3, 1)).unwrap();
        assert_eq!(mgr.cache().live_duration(), Duration::from_secs(3));
        assert!(CacheManager::<u32>::with_config(&CacheConfig::new(3, 0)).is_err());
    }
}
