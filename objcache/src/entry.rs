//! A single cached value and its access clock.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use objcache_core::constants::MIN_LIVE_BUFFER;

/// Cache entry with an idle clock.
///
/// The timestamp has its own lock so touching one key never contends with
/// touches on another.
pub(crate) struct CacheEntry<V> {
    value: V,
    last_access: Mutex<Instant>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V) -> Self {
        Self {
            value,
            last_access: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn get(&self) -> &V {
        &self.value
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }

    /// Marks the entry as accessed now.
    pub(crate) fn touch(&self) {
        let now = Instant::now();
        let mut last = self.last_access.lock();
        if now > *last {
            *last = now;
        }
    }

    /// True once the entry has been idle for longer than `live` plus the buffer.
    pub(crate) fn expired(&self, live: Duration) -> bool {
        let last = self.last_access.lock();
        last.elapsed() > live + MIN_LIVE_BUFFER
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        let mut last = self.last_access.lock();
        if let Some(earlier) = last.checked_sub(by) {
            *last = earlier;
        }
    }

    #[cfg(test)]
    fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_fresh_entry_not_expired() {
        let entry = CacheEntry::new("conn");
        assert!(!entry.expired(Duration::ZERO));
        assert_eq!(*entry.get(), "conn");
    }

    #[test_case(Duration::from_secs(1), Duration::from_millis(500), false ; "well inside live")]
    #[test_case(Duration::from_secs(1), Duration::from_millis(1050), false ; "inside buffer")]
    #[test_case(Duration::from_secs(1), Duration::from_millis(1200), true ; "past buffer")]
    #[test_case(Duration::ZERO, Duration::from_millis(150), true ; "zero live")]
    fn test_expiry_threshold(live: Duration, idle: Duration, expected: bool) {
        let entry = CacheEntry::new(1u32);
        entry.backdate(idle);
        assert_eq!(entry.expired(live), expected);
    }

    #[test]
    fn test_touch_resets_idle_clock() {
        let entry = CacheEntry::new(1u32);
        entry.backdate(Duration::from_secs(10));
        assert!(entry.expired(Duration::from_secs(1)));

        entry.touch();
        assert!(!entry.expired(Duration::from_secs(1)));
    }

    #[test]
    fn test_touch_never_moves_backward() {
        let entry = CacheEntry::new(1u32);
        let before = entry.last_access();
        entry.touch();
        entry.touch();
        assert!(entry.last_access() >= before);
    }

    #[test]
    fn test_into_value() {
        let entry = CacheEntry::new(String::from("payload"));
        assert_eq!(entry.into_value(), "payload");
    }
}
