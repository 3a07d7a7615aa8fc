use ipnetwork::IpNetwork;
use meta_dns_application::ports::{FakeIpPool, HostTable};
use meta_dns_application::services::{EnhancerConfig, FakeIpSkipper, ResolverEnhancer};
use meta_dns_application::use_cases::DnsService;
use meta_dns_domain::{Config, DnsConfig, DnsMode, UrlNameServerParser};
use meta_dns_infrastructure::dns::{
    FakeIpStateFile, HostsTable, MemoryFakeIpPool, Resolver, ResolverBuilder, ResolverConfig,
    SystemHostsReader,
};
use std::sync::Arc;
use tracing::info;

pub struct DnsServices {
    pub resolver: Resolver,
    pub enhancer: Arc<ResolverEnhancer>,
    pub service: Arc<DnsService>,
}

impl DnsServices {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let dns = &config.dns;
        info!(mode = ?dns.enhanced_mode, ipv6 = dns.ipv6, "Initializing DNS services");

        let hosts = Self::build_hosts(dns)?;

        let resolver_config = ResolverConfig::from_dns_config(dns, &UrlNameServerParser)?
            .with_hosts(hosts.clone());
        let resolver = ResolverBuilder::new(resolver_config).build()?;

        let enhancer = Arc::new(Self::build_enhancer(dns)?);
        let service = Arc::new(DnsService::new(
            Arc::new(resolver.clone()),
            &enhancer,
            hosts,
        ));

        Ok(Self {
            resolver,
            enhancer,
            service,
        })
    }

    fn build_hosts(dns: &DnsConfig) -> anyhow::Result<Option<Arc<dyn HostTable>>> {
        if !dns.use_hosts {
            return Ok(None);
        }
        let system = dns.use_system_hosts.then(SystemHostsReader::new);
        let table = HostsTable::from_config(&dns.hosts, system.as_ref())?;
        info!(entries = table.len(), "Hosts table loaded");
        Ok(Some(Arc::new(table)))
    }

    fn build_enhancer(dns: &DnsConfig) -> anyhow::Result<ResolverEnhancer> {
        let (fake_pool, fake_pool6) = if dns.enhanced_mode == DnsMode::FakeIp {
            let store = dns.store_fake_ip.as_deref();
            let pool = Self::build_pool(&dns.fake_ip_range, store)?;
            let pool6 = match &dns.fake_ip_range6 {
                Some(range) => Some(Self::build_pool(
                    range,
                    store.map(|path| format!("{}.v6", path)).as_deref(),
                )?),
                None => None,
            };
            (Some(pool), pool6)
        } else {
            (None, None)
        };

        let skipper = FakeIpSkipper::from_rules(&dns.fake_ip_filter, dns.fake_ip_filter_mode)?;

        Ok(ResolverEnhancer::new(EnhancerConfig {
            ipv6: dns.ipv6,
            mode: dns.enhanced_mode,
            fake_pool,
            fake_pool6,
            skipper: Arc::new(skipper),
            fake_ip_ttl: dns.fake_ip_ttl,
            use_hosts: dns.use_hosts,
        }))
    }

    fn build_pool(range: &str, store: Option<&str>) -> anyhow::Result<Arc<dyn FakeIpPool>> {
        let net: IpNetwork = range
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid fake-ip range '{}': {}", range, e))?;
        let mut pool = MemoryFakeIpPool::new(net)?;
        if let Some(path) = store {
            pool = pool.with_store(FakeIpStateFile::new(path));
            pool.restore_state()?;
        }
        info!(range = %net, capacity = %pool.capacity(), "Fake-ip pool ready");
        Ok(Arc::new(pool))
    }
}
