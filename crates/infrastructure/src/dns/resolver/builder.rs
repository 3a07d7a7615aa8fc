use meta_dns_application::ports::{DnsCachePort, DnsClient, HostTable, ProxyProvider};
use meta_dns_domain::config::CacheAlgorithm;
use meta_dns_domain::matcher::{parse_domain_matcher, DomainSetMatcher, IpCidrMatcher};
use meta_dns_domain::{
    DnsConfig, DomainError, DomainMatcher, IpMatcher, NameServer, NameServerParser,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::core::{Resolver, ResolverState};
use super::policy::{ClientSet, PolicyListBuilder};
use super::singleflight::SingleFlight;
use crate::dns::cache::new_message_cache;
use crate::dns::client::{ClientCache, ClientFactory};
use crate::dns::transport::{HostResolver, SystemHostResolver};

/// Servers used for domains matched by one `nameserver-policy` entry.
#[derive(Clone)]
pub struct NameServerPolicy {
    pub domain: String,
    /// Set for `regex:`, `keyword:` and `suffix:` rules; plain domains go to a trie.
    pub matcher: Option<Arc<dyn DomainMatcher>>,
    pub servers: Vec<NameServer>,
}

/// Typed resolver settings, with every server already parsed.
#[derive(Clone, Default)]
pub struct ResolverConfig {
    pub main: Vec<NameServer>,
    pub fallback: Vec<NameServer>,
    /// Bootstrap servers that resolve the host names of the others.
    pub default: Vec<NameServer>,
    pub proxy_server: Vec<NameServer>,
    pub ipv6: bool,
    pub ipv6_timeout: Duration,
    pub fallback_ip_filter: Vec<Arc<dyn IpMatcher>>,
    pub fallback_domain_filter: Vec<Arc<dyn DomainMatcher>>,
    pub hosts: Option<Arc<dyn HostTable>>,
    pub policy: Vec<NameServerPolicy>,
    pub cache_algorithm: CacheAlgorithm,
}

impl ResolverConfig {
    /// Converts the `[dns]` section, parsing server strings with `parser`.
    pub fn from_dns_config(
        cfg: &DnsConfig,
        parser: &dyn NameServerParser,
    ) -> Result<Self, DomainError> {
        let policy = cfg
            .nameserver_policy
            .iter()
            .map(|entry| {
                let matcher = parse_domain_matcher(&entry.domain).map_err(DomainError::ConfigError)?;
                Ok(NameServerPolicy {
                    domain: entry.domain.clone(),
                    matcher,
                    servers: parser.parse(&entry.servers)?,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let mut fallback_ip_filter: Vec<Arc<dyn IpMatcher>> = Vec::new();
        if !cfg.fallback_filter.ipcidr.is_empty() {
            let cidrs =
                IpCidrMatcher::new(&cfg.fallback_filter.ipcidr).map_err(DomainError::ConfigError)?;
            fallback_ip_filter.push(Arc::new(cidrs));
        }

        let mut fallback_domain_filter: Vec<Arc<dyn DomainMatcher>> = Vec::new();
        let mut plain_domains = Vec::new();
        for rule in &cfg.fallback_filter.domain {
            match parse_domain_matcher(rule).map_err(DomainError::ConfigError)? {
                Some(matcher) => fallback_domain_filter.push(matcher),
                None => plain_domains.push(rule.as_str()),
            }
        }
        if !plain_domains.is_empty() {
            let set = DomainSetMatcher::new(plain_domains).map_err(DomainError::ConfigError)?;
            fallback_domain_filter.push(Arc::new(set));
        }

        Ok(Self {
            main: parser.parse(&cfg.nameserver)?,
            fallback: parser.parse(&cfg.fallback)?,
            default: parser.parse(&cfg.default_nameserver)?,
            proxy_server: parser.parse(&cfg.proxy_server_nameserver)?,
            ipv6: cfg.ipv6,
            ipv6_timeout: Duration::from_millis(cfg.ipv6_timeout),
            fallback_ip_filter,
            fallback_domain_filter,
            hosts: None,
            policy,
            cache_algorithm: cfg.cache_algorithm,
        })
    }

    pub fn with_hosts(mut self, hosts: Option<Arc<dyn HostTable>>) -> Self {
        self.hosts = hosts;
        self
    }
}

pub struct ResolverBuilder {
    config: ResolverConfig,
    proxies: Option<Arc<dyn ProxyProvider>>,
    cache: Option<Arc<dyn DnsCachePort>>,
    clients: Option<ClientCache>,
}

impl ResolverBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            proxies: None,
            cache: None,
            clients: None,
        }
    }

    pub fn with_proxies(mut self, proxies: Arc<dyn ProxyProvider>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// Reuses a response cache, e.g. one kept across a reload.
    pub fn with_cache(mut self, cache: Arc<dyn DnsCachePort>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Starts from clients built earlier, so unchanged servers keep their connections.
    pub fn with_clients(mut self, clients: ClientCache) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn build(self) -> Result<Resolver, DomainError> {
        let config = self.config;
        let clients = self.clients.unwrap_or_default();

        let bootstrap_factory = ClientFactory::default();
        let bootstrap_main = build_set(&clients, &bootstrap_factory, &config.default)?;
        let host_resolver: Arc<dyn HostResolver> = if bootstrap_main.is_empty() {
            Arc::new(SystemHostResolver)
        } else {
            Arc::new(Resolver::from_state(ResolverState {
                ipv6: false,
                ipv6_timeout: config.ipv6_timeout,
                hosts: None,
                main: bootstrap_main,
                fallback: empty_set(),
                proxy_server: empty_set(),
                fallback_domain_filters: Vec::new(),
                fallback_ip_filters: Vec::new(),
                policies: Vec::new(),
                cache: new_message_cache(config.cache_algorithm),
                flights: SingleFlight::new(),
                clients: ClientCache::new(),
            }))
        };

        let mut factory = ClientFactory::new(host_resolver);
        if let Some(proxies) = self.proxies {
            factory = factory.with_proxies(proxies);
        }

        let main = build_set(&clients, &factory, &config.main)?;
        let fallback = build_set(&clients, &factory, &config.fallback)?;
        let proxy_server = build_set(&clients, &factory, &config.proxy_server)?;

        let mut policies = PolicyListBuilder::new();
        for policy in &config.policy {
            let servers = build_set(&clients, &factory, &policy.servers)?;
            match &policy.matcher {
                Some(matcher) => policies.push_matcher(matcher.clone(), servers),
                None => {
                    if !policies.push_domain(&policy.domain, servers) {
                        warn!(domain = %policy.domain, "Invalid nameserver policy domain, ignored");
                    }
                }
            }
        }
        let policies = policies.build();

        info!(
            main = main.len(),
            fallback = fallback.len(),
            proxy_server = proxy_server.len(),
            policies = policies.len(),
            ipv6 = config.ipv6,
            cache = ?config.cache_algorithm,
            "Building DNS resolver"
        );

        Ok(Resolver::from_state(ResolverState {
            ipv6: config.ipv6,
            ipv6_timeout: config.ipv6_timeout,
            hosts: config.hosts,
            main,
            fallback,
            proxy_server,
            fallback_domain_filters: config.fallback_domain_filter,
            fallback_ip_filters: config.fallback_ip_filter,
            policies,
            cache: self
                .cache
                .unwrap_or_else(|| new_message_cache(config.cache_algorithm)),
            flights: SingleFlight::new(),
            clients,
        }))
    }
}

fn empty_set() -> ClientSet {
    Arc::from(Vec::<Arc<dyn DnsClient>>::new())
}

fn build_set(
    clients: &ClientCache,
    factory: &ClientFactory,
    servers: &[NameServer],
) -> Result<ClientSet, DomainError> {
    let set = servers
        .iter()
        .map(|ns| clients.get_or_create(ns, factory))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::from(set))
}
