use meta_dns_domain::{DnsMode, DomainError};
use std::net::IpAddr;
use std::sync::Arc;

use super::FakeIpSkipper;
use crate::cache::ExpiringLruCache;
use crate::ports::FakeIpPool;

pub const MAPPING_CACHE_SIZE: usize = 4096;

pub struct EnhancerConfig {
    pub ipv6: bool,
    pub mode: DnsMode,
    pub fake_pool: Option<Arc<dyn FakeIpPool>>,
    pub fake_pool6: Option<Arc<dyn FakeIpPool>>,
    pub skipper: Arc<FakeIpSkipper>,
    pub fake_ip_ttl: u32,
    pub use_hosts: bool,
}

/// Owns the fake-ip pools and the ip -> host mapping used by redir-host and fake-ip modes.
pub struct ResolverEnhancer {
    mode: DnsMode,
    fake_pool: Option<Arc<dyn FakeIpPool>>,
    fake_pool6: Option<Arc<dyn FakeIpPool>>,
    skipper: Arc<FakeIpSkipper>,
    fake_ip_ttl: u32,
    mapping: Option<Arc<ExpiringLruCache<IpAddr, String>>>,
    use_hosts: bool,
}

impl ResolverEnhancer {
    pub fn new(cfg: EnhancerConfig) -> Self {
        let mut enhancer = Self {
            mode: cfg.mode,
            fake_pool: None,
            fake_pool6: None,
            skipper: cfg.skipper,
            fake_ip_ttl: 0,
            mapping: None,
            use_hosts: cfg.use_hosts,
        };

        if cfg.mode != DnsMode::Normal {
            enhancer.fake_pool = cfg.fake_pool;
            if cfg.ipv6 {
                enhancer.fake_pool6 = cfg.fake_pool6;
            }
            enhancer.fake_ip_ttl = cfg.fake_ip_ttl.max(1);
            enhancer.mapping = Some(Arc::new(ExpiringLruCache::new(MAPPING_CACHE_SIZE)));
        }

        enhancer
    }

    pub fn mode(&self) -> DnsMode {
        self.mode
    }

    pub fn fake_ip_enabled(&self) -> bool {
        self.mode == DnsMode::FakeIp
    }

    pub fn mapping_enabled(&self) -> bool {
        matches!(self.mode, DnsMode::FakeIp | DnsMode::Mapping)
    }

    pub fn use_hosts(&self) -> bool {
        self.use_hosts
    }

    pub fn fake_ip_ttl(&self) -> u32 {
        self.fake_ip_ttl
    }

    pub fn skipper(&self) -> Arc<FakeIpSkipper> {
        Arc::clone(&self.skipper)
    }

    pub fn fake_pool(&self) -> Option<Arc<dyn FakeIpPool>> {
        self.fake_pool.clone()
    }

    pub fn fake_pool6(&self) -> Option<Arc<dyn FakeIpPool>> {
        self.fake_pool6.clone()
    }

    pub fn mapping(&self) -> Option<Arc<ExpiringLruCache<IpAddr, String>>> {
        self.mapping.clone()
    }

    fn pools(&self) -> impl Iterator<Item = &Arc<dyn FakeIpPool>> {
        self.fake_pool.iter().chain(self.fake_pool6.iter())
    }

    pub fn is_exist_fake_ip(&self, ip: IpAddr) -> bool {
        self.fake_ip_enabled() && self.pools().any(|pool| pool.exist(ip))
    }

    /// In a pool range and neither its gateway nor its broadcast address.
    pub fn is_fake_ip(&self, ip: IpAddr) -> bool {
        self.fake_ip_enabled()
            && self.pools().any(|pool| {
                pool.ip_net().contains(ip) && ip != pool.gateway() && ip != pool.broadcast()
            })
    }

    pub fn is_fake_broadcast_ip(&self, ip: IpAddr) -> bool {
        self.fake_ip_enabled() && self.pools().any(|pool| pool.broadcast() == ip)
    }

    pub fn find_host_by_ip(&self, ip: IpAddr) -> Option<String> {
        if let Some(host) = self.pools().find_map(|pool| pool.look_back(ip)) {
            return Some(host);
        }
        self.mapping.as_ref().and_then(|mapping| mapping.get(&ip))
    }

    pub fn insert_host_by_ip(&self, ip: IpAddr, host: &str) {
        if let Some(mapping) = &self.mapping {
            mapping.set(ip, host.to_string());
        }
    }

    /// Flushes both pools, reporting every failure.
    pub fn flush_fake_ip(&self) -> Result<(), DomainError> {
        let errors: Vec<String> = self
            .pools()
            .filter_map(|pool| pool.flush_fake_ip().err())
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::FakeIpPool(errors.join("\n")))
        }
    }

    /// Carries runtime state over from the enhancer this one replaces.
    pub fn patch_from(&self, old: &ResolverEnhancer) {
        if let (Some(mapping), Some(old_mapping)) = (&self.mapping, &old.mapping) {
            old_mapping.clone_to(mapping);
        }
        if let (Some(pool), Some(old_pool)) = (&self.fake_pool, &old.fake_pool) {
            pool.clone_from_pool(old_pool.as_ref());
        }
        if let (Some(pool6), Some(old_pool6)) = (&self.fake_pool6, &old.fake_pool6) {
            pool6.clone_from_pool(old_pool6.as_ref());
        }
    }

    pub fn store_fake_pool_state(&self) {
        for pool in self.pools() {
            if let Err(e) = pool.store_state() {
                tracing::warn!(error = %e, "Failed to store fake-ip pool state");
            }
        }
    }
}
