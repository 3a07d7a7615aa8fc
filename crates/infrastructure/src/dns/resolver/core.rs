use async_trait::async_trait;
use futures::FutureExt;
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RecordType};
use meta_dns_application::dns::{
    is_ip_request, msg_to_domain, msg_to_ip, question_key, set_msg_ttl, update_msg_ttl,
};
use meta_dns_application::ports::{DnsCachePort, DnsClient, DnsExchanger, HostTable};
use meta_dns_application::DnsContext;
use meta_dns_domain::host_value::unmap;
use meta_dns_domain::{DomainError, DomainMatcher, IpMatcher};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::policy::{match_policy, ClientSet, Policy};
use super::singleflight::{FlightWork, SingleFlight};
use crate::dns::batch::batch_exchange;
use crate::dns::cache::put_msg_to_cache;
use crate::dns::client::{ClientCache, DEFAULT_DNS_TIMEOUT};
use crate::dns::transport::HostResolver;

/// Used when no IPv6 wait is configured.
pub const DEFAULT_IPV6_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) struct ResolverState {
    pub(crate) ipv6: bool,
    pub(crate) ipv6_timeout: Duration,
    pub(crate) hosts: Option<Arc<dyn HostTable>>,
    pub(crate) main: ClientSet,
    pub(crate) fallback: ClientSet,
    pub(crate) proxy_server: ClientSet,
    pub(crate) fallback_domain_filters: Vec<Arc<dyn DomainMatcher>>,
    pub(crate) fallback_ip_filters: Vec<Arc<dyn IpMatcher>>,
    pub(crate) policies: Vec<Policy>,
    pub(crate) cache: Arc<dyn DnsCachePort>,
    pub(crate) flights: SingleFlight,
    /// Clients this resolver built and must close.
    pub(crate) clients: ClientCache,
}

/// Cached, policy-aware resolver over the configured upstream sets.
#[derive(Clone)]
pub struct Resolver {
    state: Arc<ResolverState>,
}

fn empty_set() -> ClientSet {
    Arc::from(Vec::<Arc<dyn DnsClient>>::new())
}

impl Resolver {
    pub(crate) fn from_state(state: ResolverState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Resolver for proxy server names: the proxy-server set as main servers,
    /// sharing the cache, hosts and IPv6 settings of `old`.
    ///
    /// Its clients stay owned by `old`.
    pub fn new_proxy_server_host_resolver(old: &Resolver) -> Resolver {
        Resolver::from_state(ResolverState {
            ipv6: old.state.ipv6,
            ipv6_timeout: old.state.ipv6_timeout,
            hosts: old.state.hosts.clone(),
            main: old.state.proxy_server.clone(),
            fallback: empty_set(),
            proxy_server: empty_set(),
            fallback_domain_filters: Vec::new(),
            fallback_ip_filters: Vec::new(),
            policies: Vec::new(),
            cache: old.state.cache.clone(),
            flights: SingleFlight::new(),
            clients: ClientCache::new(),
        })
    }

    pub fn ipv6(&self) -> bool {
        self.state.ipv6
    }

    pub fn cache(&self) -> Arc<dyn DnsCachePort> {
        self.state.cache.clone()
    }

    /// True when the resolver has main servers to ask.
    pub fn invalid(&self) -> bool {
        !self.state.main.is_empty()
    }

    pub fn has_proxy_servers(&self) -> bool {
        !self.state.proxy_server.is_empty()
    }

    /// Clients built for this resolver, for [`super::ResolverBuilder::with_clients`].
    pub fn clients(&self) -> ClientCache {
        self.state.clients.clone()
    }

    pub fn clear_cache(&self) {
        self.state.cache.clear();
    }

    /// Closes every client this resolver built.
    pub async fn close(&self) {
        for client in self.state.clients.clients() {
            client.close().await;
        }
    }

    /// Answers `msg` from the cache, or from upstream on a miss.
    ///
    /// Expired entries are served with TTL 1 while one background query
    /// refreshes them.
    pub async fn exchange(&self, ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError> {
        let query = msg.queries().first().ok_or(DomainError::NoQuestion)?;

        if let Err(e) = ctx.check() {
            self.refresh_in_background(msg.clone());
            return Err(e);
        }

        let key = question_key(query);
        if let Some((mut cached, expires)) = self.state.cache.get_with_expire(&key) {
            let now = Instant::now();
            debug!(
                domain = %msg_to_domain(msg),
                ips = ?msg_to_ip(&cached),
                qtype = %query.query_type(),
                expires_in = ?expires.saturating_duration_since(now),
                "DNS cache hit"
            );
            if expires < now {
                set_msg_ttl(&mut cached, 1);
                self.refresh_in_background(msg.clone());
            } else {
                let remaining = (expires - now).as_secs();
                update_msg_ttl(&mut cached, u32::try_from(remaining).unwrap_or(u32::MAX));
            }
            cached.set_id(msg.id());
            return Ok(cached);
        }

        let result = self.exchange_without_cache(ctx, msg).await;
        if matches!(&result, Err(e) if e.is_context_error()) {
            self.refresh_in_background(msg.clone());
        }
        result
    }

    fn refresh_in_background(&self, msg: Message) {
        let resolver = self.clone();
        tokio::spawn(async move {
            let ctx = DnsContext::new().with_timeout(DEFAULT_DNS_TIMEOUT);
            if let Err(e) = resolver.exchange_without_cache(&ctx, &msg).await {
                debug!(domain = %msg_to_domain(&msg), error = %e, "Background refresh failed");
            }
        });
    }

    /// Upstream exchange shared between concurrent identical questions.
    ///
    /// Giving up through `ctx` returns the context error but leaves the
    /// shared query running.
    async fn exchange_without_cache(
        &self,
        ctx: &DnsContext,
        msg: &Message,
    ) -> Result<Message, DomainError> {
        let query = msg.queries().first().ok_or(DomainError::NoQuestion)?;
        let key = question_key(query);
        let handle = self.state.flights.join(&key, self.flight_work(msg.clone()));

        let result = tokio::select! {
            biased;
            result = handle.wait() => result,
            err = ctx.done() => return Err(err),
        };
        let mut response = result.into_result()?;
        response.set_id(msg.id());
        Ok(response)
    }

    fn flight_work(&self, msg: Message) -> FlightWork {
        let resolver = self.clone();
        let msg = Arc::new(msg);
        Arc::new(move || {
            let resolver = resolver.clone();
            let msg = msg.clone();
            async move { resolver.fetch(&msg).await }.boxed()
        })
    }

    async fn fetch(&self, msg: &Message) -> Result<Message, DomainError> {
        let query = msg
            .queries()
            .first()
            .cloned()
            .ok_or(DomainError::NoQuestion)?;

        let (mut response, cache) = if is_ip_request(&query) {
            (self.ip_exchange(msg).await?, true)
        } else {
            let clients = self
                .match_policy(msg)
                .unwrap_or_else(|| self.state.main.clone());
            let batch = batch_exchange(&clients, msg).await?;
            (batch.message, batch.cache)
        };

        if cache {
            *response.extensions_mut() = None;
            put_msg_to_cache(self.state.cache.as_ref(), &question_key(&query), &query, &response);
        }
        Ok(response)
    }

    fn match_policy(&self, msg: &Message) -> Option<ClientSet> {
        match_policy(&self.state.policies, &msg_to_domain(msg)).cloned()
    }

    fn should_only_query_fallback(&self, msg: &Message) -> bool {
        if self.state.fallback.is_empty() || self.state.fallback_domain_filters.is_empty() {
            return false;
        }
        let domain = msg_to_domain(msg);
        if domain.is_empty() {
            return false;
        }
        self.state
            .fallback_domain_filters
            .iter()
            .any(|filter| filter.match_domain(&domain))
    }

    fn should_ip_fallback(&self, ip: IpAddr) -> bool {
        self.state
            .fallback_ip_filters
            .iter()
            .any(|filter| filter.match_ip(ip))
    }

    /// Policy servers, then fallback-only domains, then main with a fallback
    /// when main fails or returns addresses the IP filters flag.
    async fn ip_exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        if let Some(clients) = self.match_policy(msg) {
            return Ok(batch_exchange(&clients, msg).await?.message);
        }

        if self.should_only_query_fallback(msg) {
            return Ok(batch_exchange(&self.state.fallback, msg).await?.message);
        }

        let main = batch_exchange(&self.state.main, msg).await;
        if self.state.fallback.is_empty() {
            return main.map(|batch| batch.message);
        }

        if let Ok(batch) = main {
            let ips = msg_to_ip(&batch.message);
            if !ips.is_empty() && ips.iter().all(|ip| !self.should_ip_fallback(*ip)) {
                return Ok(batch.message);
            }
        }

        Ok(batch_exchange(&self.state.fallback, msg).await?.message)
    }

    async fn lookup_ip_with_type(
        &self,
        ctx: &DnsContext,
        host: &str,
        rtype: RecordType,
    ) -> Result<Vec<IpAddr>, DomainError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            let ip = unmap(ip);
            return match (rtype, ip) {
                (RecordType::A, IpAddr::V4(_)) | (RecordType::AAAA, IpAddr::V6(_)) => Ok(vec![ip]),
                _ => Err(DomainError::IpVersionMismatch),
            };
        }

        if let Some(ips) = self.search_hosts(host, rtype) {
            return Ok(ips);
        }

        let name = Name::from_utf8(format!("{}.", host.trim_end_matches('.')))
            .map_err(|_| DomainError::InvalidDomainName(host.to_string()))?;
        let mut query = Message::new();
        query
            .set_id(fastrand::u16(..))
            .set_recursion_desired(true)
            .add_query(Query::query(name, rtype));

        let msg = self.exchange(ctx, &query).await?;
        let ips: Vec<IpAddr> = msg_to_ip(&msg)
            .into_iter()
            .filter(|ip| match rtype {
                RecordType::A => ip.is_ipv4(),
                _ => ip.is_ipv6(),
            })
            .collect();
        if ips.is_empty() {
            return Err(DomainError::IpNotFound);
        }
        Ok(ips)
    }

    fn search_hosts(&self, host: &str, rtype: RecordType) -> Option<Vec<IpAddr>> {
        let found = self.state.hosts.as_ref()?.search(host, false)?;
        if !found.kind_matched {
            return None;
        }
        let ips: Vec<IpAddr> = found
            .value
            .ips()
            .iter()
            .copied()
            .filter(|ip| (rtype == RecordType::A) == ip.is_ipv4())
            .collect();
        (!ips.is_empty()).then_some(ips)
    }

    pub async fn lookup_ipv4(&self, ctx: &DnsContext, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        self.lookup_ip_with_type(ctx, host, RecordType::A).await
    }

    pub async fn lookup_ipv6(&self, ctx: &DnsContext, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        self.lookup_ip_with_type(ctx, host, RecordType::AAAA).await
    }

    /// IPv4 and IPv6 addresses of `host`.
    ///
    /// The IPv4 lookup decides the outcome; IPv6 answers are appended when
    /// they arrive within the IPv6 timeout.
    pub async fn lookup_ip(&self, ctx: &DnsContext, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        if !self.state.ipv6 {
            return self.lookup_ipv4(ctx, host).await;
        }

        let resolver = self.clone();
        let v6_ctx = ctx.child();
        let v6_host = host.to_string();
        let v6 = tokio::spawn(async move { resolver.lookup_ipv6(&v6_ctx, &v6_host).await });

        let v4 = self.lookup_ipv4(ctx, host).await;

        let wait = if self.state.ipv6_timeout.is_zero() {
            DEFAULT_IPV6_TIMEOUT
        } else {
            self.state.ipv6_timeout
        };
        match tokio::time::timeout(wait, v6).await {
            Ok(Ok(Ok(v6_ips))) => {
                let mut ips = v4.unwrap_or_default();
                ips.extend(v6_ips);
                Ok(ips)
            }
            Ok(_) => v4.map_err(|_| DomainError::IpNotFound),
            Err(_) => v4,
        }
    }

    /// IPv4 first; IPv6 addresses only when the IPv4 lookup fails.
    pub async fn lookup_ip_primary_ipv4(
        &self,
        ctx: &DnsContext,
        host: &str,
    ) -> Result<Vec<IpAddr>, DomainError> {
        let resolver = self.clone();
        let v6_ctx = ctx.child();
        let v6_host = host.to_string();
        let v6 = tokio::spawn(async move { resolver.lookup_ipv6(&v6_ctx, &v6_host).await });

        match self.lookup_ipv4(ctx, host).await {
            Ok(ips) => {
                v6.abort();
                Ok(ips)
            }
            Err(_) => match v6.await {
                Ok(Ok(ips)) => Ok(ips),
                _ => Err(DomainError::IpNotFound),
            },
        }
    }
}

#[async_trait]
impl DnsExchanger for Resolver {
    async fn exchange(&self, ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError> {
        Resolver::exchange(self, ctx, msg).await
    }

    fn ipv6_enabled(&self) -> bool {
        self.state.ipv6
    }
}

#[async_trait]
impl HostResolver for Resolver {
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        let ctx = DnsContext::new().with_timeout(DEFAULT_DNS_TIMEOUT);
        self.lookup_ip(&ctx, host).await
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("ipv6", &self.state.ipv6)
            .field("main", &self.state.main.len())
            .field("fallback", &self.state.fallback.len())
            .field("policies", &self.state.policies.len())
            .field("cached", &self.state.cache.len())
            .finish()
    }
}

