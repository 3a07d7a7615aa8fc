use ipnetwork::IpNetwork;
use lru::LruCache;
use meta_dns_application::ports::FakeIpPool;
use meta_dns_domain::DomainError;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::store::FakeIpStateFile;

fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_u128(value: u128, v4: bool) -> IpAddr {
    if v4 {
        // values of a v4 pool never exceed u32::MAX
        IpAddr::V4(Ipv4Addr::from(value as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(value))
    }
}

struct PoolState {
    /// Last allocated or restored offset; `first - 1` right after a flush.
    offset: u128,
    /// Least recently used first when iterated in reverse.
    by_host: LruCache<String, u128>,
    by_ip: HashMap<u128, String>,
}

/// In-memory fake-ip allocator over one network.
///
/// The first host address is the gateway and the last address the broadcast;
/// everything between is handed out in order, then recycled oldest slot first.
pub struct MemoryFakeIpPool {
    net: IpNetwork,
    v4: bool,
    gateway: u128,
    broadcast: u128,
    first: u128,
    last: u128,
    state: Mutex<PoolState>,
    store: Option<FakeIpStateFile>,
}

impl MemoryFakeIpPool {
    pub fn new(net: IpNetwork) -> Result<Self, DomainError> {
        let v4 = net.is_ipv4();
        let (network, broadcast) = match net {
            IpNetwork::V4(n) => (
                u128::from(u32::from(n.network())),
                u128::from(u32::from(n.broadcast())),
            ),
            IpNetwork::V6(n) => {
                let network = u128::from(n.network());
                (network, network | !u128::from(n.mask()))
            }
        };
        if broadcast - network < 3 {
            return Err(DomainError::FakeIpPool(format!(
                "network {} is too small for a fake-ip pool",
                net
            )));
        }
        let gateway = network + 1;
        let first = gateway + 1;
        let last = broadcast - 1;

        Ok(Self {
            net,
            v4,
            gateway,
            broadcast,
            first,
            last,
            state: Mutex::new(PoolState {
                offset: first - 1,
                by_host: LruCache::unbounded(),
                by_ip: HashMap::new(),
            }),
            store: None,
        })
    }

    /// Persists bindings to `file` on [`FakeIpPool::store_state`].
    pub fn with_store(mut self, file: FakeIpStateFile) -> Self {
        self.store = Some(file);
        self
    }

    /// Loads the bindings saved by the previous run, if a store is set.
    pub fn restore_state(&self) -> Result<usize, DomainError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let restored = store
            .load()?
            .into_iter()
            .filter(|(host, ip)| self.restore(host, *ip))
            .count();
        info!(restored, range = %self.net, "Fake-ip state restored");
        Ok(restored)
    }

    pub fn capacity(&self) -> u128 {
        self.last - self.first + 1
    }

    pub fn len(&self) -> usize {
        self.lock().by_ip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocatable(&self, value: u128) -> bool {
        value >= self.first && value <= self.last
    }

    /// Next free slot after the last allocation; once every slot is bound the
    /// least recently used host gives up its address.
    fn allocate(&self, state: &mut PoolState, host: &str) -> u128 {
        let offset = if (state.by_ip.len() as u128) < self.capacity() {
            let mut candidate = state.offset;
            loop {
                candidate = if candidate >= self.last {
                    self.first
                } else {
                    candidate + 1
                };
                if !state.by_ip.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            match state.by_host.pop_lru() {
                Some((evicted, offset)) => {
                    debug!(host = %evicted, "Fake-ip pool full, recycling oldest binding");
                    state.by_ip.remove(&offset);
                    offset
                }
                None => self.first,
            }
        };
        state.offset = offset;
        state.by_ip.insert(offset, host.to_string());
        offset
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FakeIpPool for MemoryFakeIpPool {
    fn lookup(&self, host: &str) -> IpAddr {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let mut state = self.lock();
        if let Some(offset) = state.by_host.get(&host) {
            return from_u128(*offset, self.v4);
        }
        let offset = self.allocate(&mut state, &host);
        state.by_host.put(host, offset);
        from_u128(offset, self.v4)
    }

    fn look_back(&self, ip: IpAddr) -> Option<String> {
        if ip.is_ipv4() != self.v4 {
            return None;
        }
        let mut state = self.lock();
        let host = state.by_ip.get(&to_u128(ip))?.clone();
        state.by_host.promote(&host);
        Some(host)
    }

    fn exist(&self, ip: IpAddr) -> bool {
        ip.is_ipv4() == self.v4 && self.lock().by_ip.contains_key(&to_u128(ip))
    }

    fn ip_net(&self) -> IpNetwork {
        self.net
    }

    fn gateway(&self) -> IpAddr {
        from_u128(self.gateway, self.v4)
    }

    fn broadcast(&self) -> IpAddr {
        from_u128(self.broadcast, self.v4)
    }

    fn flush_fake_ip(&self) -> Result<(), DomainError> {
        {
            let mut state = self.lock();
            state.by_host.clear();
            state.by_ip.clear();
            state.offset = self.first - 1;
        }
        if let Some(store) = &self.store {
            store.remove()?;
        }
        debug!(range = %self.net, "Fake-ip pool flushed");
        Ok(())
    }

    fn entries(&self) -> Vec<(String, IpAddr)> {
        let state = self.lock();
        state
            .by_host
            .iter()
            .rev()
            .map(|(host, offset)| (host.clone(), from_u128(*offset, self.v4)))
            .collect()
    }

    fn restore(&self, host: &str, ip: IpAddr) -> bool {
        if ip.is_ipv4() != self.v4 {
            return false;
        }
        let value = to_u128(ip);
        if !self.allocatable(value) {
            return false;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();

        let mut state = self.lock();
        if let Some(previous) = state.by_ip.remove(&value) {
            state.by_host.pop(&previous);
        }
        if let Some(old) = state.by_host.pop(&host) {
            state.by_ip.remove(&old);
        }
        state.by_ip.insert(value, host.clone());
        state.by_host.put(host, value);
        if value > state.offset {
            state.offset = value;
        }
        true
    }

    fn store_state(&self) -> Result<(), DomainError> {
        match &self.store {
            Some(store) => store.save(&self.entries()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cidr: &str) -> MemoryFakeIpPool {
        MemoryFakeIpPool::new(cidr.parse().unwrap()).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_reserved_addresses() {
        let pool = pool("198.18.0.1/16");
        assert_eq!(pool.gateway(), ip("198.18.0.1"));
        assert_eq!(pool.broadcast(), ip("198.18.255.255"));
        assert_eq!(pool.capacity(), 65533);
        assert_eq!(pool.lookup("first.example"), ip("198.18.0.2"));
    }

    #[test]
    fn test_lookup_is_stable_until_flush() {
        let pool = pool("198.18.0.0/16");
        let a = pool.lookup("foo.test");
        assert_eq!(pool.lookup("FOO.test."), a);
        assert_ne!(pool.lookup("bar.test"), a);
        assert_eq!(pool.look_back(a).as_deref(), Some("foo.test"));
        assert!(pool.exist(a));

        pool.flush_fake_ip().unwrap();
        assert!(!pool.exist(a));
        assert_eq!(pool.lookup("bar.test"), a);
    }

    #[test]
    fn test_full_pool_recycles_oldest_slot() {
        let pool = pool("10.0.0.0/29");
        assert_eq!(pool.capacity(), 5);
        let addrs: Vec<IpAddr> = (0..5).map(|i| pool.lookup(&format!("h{}.lan", i))).collect();
        assert_eq!(addrs[0], ip("10.0.0.2"));
        assert_eq!(addrs[4], ip("10.0.0.6"));

        let recycled = pool.lookup("new.lan");
        assert_eq!(recycled, addrs[0]);
        assert_eq!(pool.look_back(recycled).as_deref(), Some("new.lan"));
        assert_eq!(pool.len(), 5);
        assert_ne!(pool.lookup("h0.lan"), recycled);
    }

    #[test]
    fn test_restore_and_clone_from() {
        let old = pool("198.18.0.0/16");
        let a = old.lookup("a.example");
        let b = old.lookup("b.example");

        let new = pool("198.18.0.0/16");
        new.clone_from_pool(&old);
        assert_eq!(new.lookup("a.example"), a);
        assert_eq!(new.look_back(b).as_deref(), Some("b.example"));

        assert!(!new.restore("out.example", ip("10.0.0.1")));
        assert!(!new.restore("gw.example", new.gateway()));
    }

    #[test]
    fn test_new_host_after_reload_keeps_carried_bindings() {
        let old = pool("198.18.0.0/16");
        let kept = old.lookup("kept.example");

        let new = pool("198.18.0.0/16");
        new.clone_from_pool(&old);
        let fresh = new.lookup("fresh.example");

        assert_ne!(fresh, kept);
        assert_eq!(new.look_back(kept).as_deref(), Some("kept.example"));
        assert_eq!(new.look_back(fresh).as_deref(), Some("fresh.example"));
    }

    #[test]
    fn test_allocation_skips_restored_slots() {
        let pool = pool("10.0.0.0/29");
        assert!(pool.restore("pinned.lan", ip("10.0.0.3")));
        assert!(pool.restore("low.lan", ip("10.0.0.2")));

        let next = pool.lookup("next.lan");
        assert_eq!(next, ip("10.0.0.4"));
        assert_eq!(pool.look_back(ip("10.0.0.2")).as_deref(), Some("low.lan"));
        assert_eq!(pool.look_back(ip("10.0.0.3")).as_deref(), Some("pinned.lan"));
    }

    #[test]
    fn test_entries_oldest_first() {
        let pool = pool("198.18.0.0/24");
        pool.lookup("one.lan");
        pool.lookup("two.lan");
        let hosts: Vec<String> = pool.entries().into_iter().map(|(h, _)| h).collect();
        assert_eq!(hosts, vec!["one.lan", "two.lan"]);
    }

    #[test]
    fn test_ipv6_pool() {
        let pool = pool("fdfe:dcba:9876::1/64");
        assert_eq!(pool.gateway(), ip("fdfe:dcba:9876::1"));
        assert_eq!(pool.lookup("v6.example"), ip("fdfe:dcba:9876::2"));
        assert!(!pool.exist(ip("198.18.0.2")));
    }

    #[test]
    fn test_too_small_network_rejected() {
        assert!(MemoryFakeIpPool::new("10.0.0.0/31".parse().unwrap()).is_err());
    }

    #[test]
    fn test_store_and_restore_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fakeip.json");

        let first = pool("198.18.0.0/16").with_store(FakeIpStateFile::new(&path));
        let addr = first.lookup("kept.example");
        first.store_state().unwrap();

        let second = pool("198.18.0.0/16").with_store(FakeIpStateFile::new(&path));
        assert_eq!(second.restore_state().unwrap(), 1);
        assert_eq!(second.look_back(addr).as_deref(), Some("kept.example"));
    }
}
