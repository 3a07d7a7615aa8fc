use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tokio::time::Instant;

use super::lock;

struct Entry<V> {
    value: V,
    expires: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires, Some(expires) if expires <= now)
    }
}

/// Thread-safe LRU with optional per-entry expiry.
///
/// With `stale` enabled, expired entries are still returned (together with their expiry)
/// and only leave the cache through eviction.
pub struct ExpiringLruCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    stale: bool,
}

impl<K: Hash + Eq + Clone, V: Clone> ExpiringLruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            stale: false,
        }
    }

    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_with_expire(key).map(|(value, _)| value)
    }

    pub fn get_with_expire(&self, key: &K) -> Option<(V, Option<Instant>)> {
        let now = Instant::now();
        let mut cache = lock(&self.inner);
        let entry = cache.get(key)?;
        if entry.is_expired(now) && !self.stale {
            cache.pop(key);
            return None;
        }
        Some((entry.value.clone(), entry.expires))
    }

    /// Membership test that does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        let cache = lock(&self.inner);
        match cache.peek(key) {
            Some(entry) => self.stale || !entry.is_expired(now),
            None => false,
        }
    }

    pub fn set(&self, key: K, value: V) {
        lock(&self.inner).put(
            key,
            Entry {
                value,
                expires: None,
            },
        );
    }

    pub fn set_with_expire(&self, key: K, value: V, expires: Instant) {
        lock(&self.inner).put(
            key,
            Entry {
                value,
                expires: Some(expires),
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        lock(&self.inner).pop(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        lock(&self.inner).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries ordered least-recently-used first.
    pub fn entries(&self) -> Vec<(K, V, Option<Instant>)> {
        lock(&self.inner)
            .iter()
            .rev()
            .map(|(key, entry)| (key.clone(), entry.value.clone(), entry.expires))
            .collect()
    }

    /// Copies every live entry into `other`, keeping the recency order.
    pub fn clone_to(&self, other: &Self) {
        let now = Instant::now();
        let entries = self.entries();
        let mut target = lock(&other.inner);
        for (key, value, expires) in entries {
            if matches!(expires, Some(e) if e <= now) && !self.stale {
                continue;
            }
            target.put(key, Entry { value, expires });
        }
    }
}
