//! Response caches behind [`DnsCachePort`].

use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::RecordType;
use meta_dns_application::cache::{ArcCache, ExpiringLruCache};
use meta_dns_application::dns::{minimal_ttl, query_domain};
use meta_dns_application::ports::DnsCachePort;
use meta_dns_domain::config::CacheAlgorithm;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const CACHE_SIZE: usize = 4096;

/// RFC 2308 §7.1 allows caching server failures, for at most five minutes.
pub const SERVER_FAILURE_CACHE_TTL: u32 = 5;

/// LRU that keeps expired entries so they can be served stale.
pub struct LruMessageCache {
    inner: ExpiringLruCache<String, Message>,
}

impl LruMessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ExpiringLruCache::new(capacity).with_stale(true),
        }
    }
}

impl Default for LruMessageCache {
    fn default() -> Self {
        Self::new(CACHE_SIZE)
    }
}

impl DnsCachePort for LruMessageCache {
    fn get_with_expire(&self, key: &str) -> Option<(Message, Instant)> {
        let (msg, expires) = self.inner.get_with_expire(&key.to_string())?;
        Some((msg, expires?))
    }

    fn set_with_expire(&self, key: &str, msg: Message, expire: Instant) {
        self.inner.set_with_expire(key.to_string(), msg, expire);
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub struct ArcMessageCache {
    inner: ArcCache<String, Message>,
}

impl ArcMessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArcCache::new(capacity),
        }
    }
}

impl Default for ArcMessageCache {
    fn default() -> Self {
        Self::new(CACHE_SIZE)
    }
}

impl DnsCachePort for ArcMessageCache {
    fn get_with_expire(&self, key: &str) -> Option<(Message, Instant)> {
        let (msg, expires) = self.inner.get_with_expire(&key.to_string())?;
        Some((msg, expires?))
    }

    fn set_with_expire(&self, key: &str, msg: Message, expire: Instant) {
        self.inner.set_with_expire(key.to_string(), msg, expire);
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub fn new_message_cache(algorithm: CacheAlgorithm) -> Arc<dyn DnsCachePort> {
    match algorithm {
        CacheAlgorithm::Lru => Arc::new(LruMessageCache::default()),
        CacheAlgorithm::Arc => Arc::new(ArcMessageCache::default()),
    }
}

/// Stores a copy of `msg` under `key` until its smallest TTL runs out.
///
/// ACME challenge lookups are never cached, SERVFAIL is kept for five seconds,
/// and answers whose minimal TTL is zero are not stored.
pub fn put_msg_to_cache(cache: &dyn DnsCachePort, key: &str, query: &Query, msg: &Message) {
    let domain = query_domain(query);
    if query.query_type() == RecordType::TXT && domain.starts_with("_acme-challenge.") {
        debug!(domain = %domain, "DNS cache ignored because of acme challenge");
        return;
    }

    let ttl = if msg.response_code() == ResponseCode::ServFail {
        SERVER_FAILURE_CACHE_TTL
    } else {
        minimal_ttl(msg)
    };
    if ttl == 0 {
        return;
    }

    let mut copy = msg.clone();
    *copy.extensions_mut() = None;
    cache.set_with_expire(key, copy, Instant::now() + Duration::from_secs(u64::from(ttl)));
}
