use lru::LruCache;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::time::Instant;

use super::lock;

struct Entry<V> {
    value: V,
    expires: Option<Instant>,
}

/// Resident lists (`t1` seen once, `t2` seen again) and ghost lists of recently evicted keys.
struct ArcState<K: Hash + Eq, V> {
    capacity: usize,
    target: usize,
    t1: LruCache<K, Entry<V>>,
    t2: LruCache<K, Entry<V>>,
    b1: LruCache<K, ()>,
    b2: LruCache<K, ()>,
}

impl<K: Hash + Eq + Clone, V> ArcState<K, V> {
    fn replace(&mut self, in_b2: bool) {
        let t1_len = self.t1.len();
        if t1_len > 0 && (t1_len > self.target || (in_b2 && t1_len == self.target)) {
            if let Some((key, _)) = self.t1.pop_lru() {
                self.b1.put(key, ());
            }
        } else if let Some((key, _)) = self.t2.pop_lru() {
            self.b2.put(key, ());
        } else if let Some((key, _)) = self.t1.pop_lru() {
            self.b1.put(key, ());
        }
    }

    fn resident(&self) -> usize {
        self.t1.len() + self.t2.len()
    }
}

/// Adaptive replacement cache with per-entry expiry.
///
/// Expired entries are returned as-is; callers decide whether to use them.
pub struct ArcCache<K: Hash + Eq, V> {
    state: Mutex<ArcState<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> ArcCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ArcState {
                capacity: capacity.max(1),
                target: 0,
                t1: LruCache::unbounded(),
                t2: LruCache::unbounded(),
                b1: LruCache::unbounded(),
                b2: LruCache::unbounded(),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_with_expire(key).map(|(value, _)| value)
    }

    pub fn get_with_expire(&self, key: &K) -> Option<(V, Option<Instant>)> {
        let mut state = lock(&self.state);
        if let Some(entry) = state.t1.pop(key) {
            let hit = (entry.value.clone(), entry.expires);
            state.t2.put(key.clone(), entry);
            return Some(hit);
        }
        state
            .t2
            .get(key)
            .map(|entry| (entry.value.clone(), entry.expires))
    }

    pub fn set(&self, key: K, value: V) {
        self.insert(key, value, None);
    }

    pub fn set_with_expire(&self, key: K, value: V, expires: Instant) {
        self.insert(key, value, Some(expires));
    }

    fn insert(&self, key: K, value: V, expires: Option<Instant>) {
        let mut state = lock(&self.state);
        let entry = Entry { value, expires };

        if state.t1.pop(&key).is_some() || state.t2.contains(&key) {
            state.t2.put(key, entry);
            return;
        }

        if state.b1.contains(&key) {
            let delta = (state.b2.len() / state.b1.len()).max(1);
            state.target = (state.target + delta).min(state.capacity);
            if state.resident() >= state.capacity {
                state.replace(false);
            }
            state.b1.pop(&key);
            state.t2.put(key, entry);
            return;
        }

        if state.b2.contains(&key) {
            let delta = (state.b1.len() / state.b2.len()).max(1);
            state.target = state.target.saturating_sub(delta);
            if state.resident() >= state.capacity {
                state.replace(true);
            }
            state.b2.pop(&key);
            state.t2.put(key, entry);
            return;
        }

        let capacity = state.capacity;
        if state.t1.len() + state.b1.len() >= capacity {
            if state.t1.len() < capacity {
                state.b1.pop_lru();
                state.replace(false);
            } else {
                state.t1.pop_lru();
            }
        } else {
            let total = state.resident() + state.b1.len() + state.b2.len();
            if total >= capacity {
                if total >= 2 * capacity {
                    state.b2.pop_lru();
                }
                if state.resident() >= capacity {
                    state.replace(false);
                }
            }
        }
        state.t1.put(key, entry);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = lock(&self.state);
        state
            .t1
            .pop(key)
            .or_else(|| state.t2.pop(key))
            .map(|entry| entry.value)
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.t1.clear();
        state.t2.clear();
        state.b1.clear();
        state.b2.clear();
        state.target = 0;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).resident()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = ArcCache::new(4);
        for i in 0..32 {
            cache.set(i, i * 10);
            if i % 3 == 0 {
                cache.get(&(i / 2));
            }
            assert!(cache.len() <= 4);
        }
    }

    #[test]
    fn test_frequent_keys_survive_scan() {
        let cache = ArcCache::new(4);
        cache.set("hot".to_string(), 1);
        assert_eq!(cache.get(&"hot".to_string()), Some(1));

        for i in 0..32 {
            cache.set(format!("scan-{}", i), i);
        }
        assert_eq!(cache.get(&"hot".to_string()), Some(1));
        assert_eq!(cache.get(&"scan-0".to_string()), None);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_update_existing_key() {
        let cache = ArcCache::new(2);
        cache.set("a", 1);
        cache.set("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ghost_hit_readmits_into_frequent_list() {
        let cache = ArcCache::new(2);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get(&"b"), None);

        cache.set("b", 20);
        assert_eq!(cache.get(&"b"), Some(20));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = ArcCache::new(2);
        cache.set(1, 1);
        cache.set(2, 2);
        assert_eq!(cache.remove(&1), Some(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
