//! Time-limited memoization with an injectable clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Source of "now" for expiry checks. Tests swap in a manual clock.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Key -> (value, expiry) map. Expired entries are never returned and are
/// dropped lazily on the next lookup of the same key.
#[derive(Debug)]
pub struct TtlCache<K, V, C = SystemClock> {
    entries: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
    clock: C,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V, SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<K: Eq + Hash, V: Clone, C: Clock> TtlCache<K, V, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a clone of the live value for `key`, if any.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Time left before `key` expires, `None` if absent or already expired.
    pub fn time_remaining(&self, key: &K) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(now))
            .filter(|left| !left.is_zero())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Clock that only moves when told to.
    #[derive(Debug, Clone)]
    pub(crate) struct ManualClock {
        now: Arc<Mutex<Instant>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                now: Arc::new(Mutex::new(Instant::now())),
            }
        }

        pub(crate) fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn returns_value_inside_ttl() {
        let clock = ManualClock::new();
        let mut cache = TtlCache::with_clock(Duration::from_secs(60), clock.clone());
        cache.insert("markets", 7);

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"markets"), Some(7));
    }

    #[test]
    fn expires_exactly_at_ttl() {
        let clock = ManualClock::new();
        let mut cache = TtlCache::with_clock(Duration::from_secs(60), clock.clone());
        cache.insert("markets", 7);

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get(&"markets"), None);
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn reinsert_resets_expiry() {
        let clock = ManualClock::new();
        let mut cache = TtlCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.insert((), "old");
        clock.advance(Duration::from_secs(8));
        cache.insert((), "new");
        clock.advance(Duration::from_secs(8));

        assert_eq!(cache.get(&()), Some("new"));
        assert_eq!(cache.time_remaining(&()), Some(Duration::from_secs(2)));
    }

    #[test]
    fn missing_key_has_no_time_remaining() {
        let mut cache: TtlCache<(), u8> = TtlCache::new(Duration::from_secs(10));
        assert_eq!(cache.get(&()), None);
        assert_eq!(cache.time_remaining(&()), None);
        cache.insert((), 1);
        assert!(cache.time_remaining(&()).is_some());
    }
}
