use crate::dns::transport::tcp::TcpTransport;
use crate::dns::transport::{Dialer, HostResolver, ServerAddr, SystemHostResolver, Transport};
use meta_dns_application::ports::{DnsClient, ProxyAdapter, ProxyProvider};
use meta_dns_domain::{DomainError, NameServer, NameServerNet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::dhcp::DhcpClient;
use super::disable_types::{disabled_types, DisableTypeClient};
use super::edns0_subnet::{parse_ecs, EdnsClientSubnetClient};
use super::rcode::RCodeClient;
use super::system::SystemClient;
use super::wire::WireClient;

/// Builds upstream clients from [`NameServer`] entries.
#[derive(Clone)]
pub struct ClientFactory {
    host_resolver: Arc<dyn HostResolver>,
    proxies: Option<Arc<dyn ProxyProvider>>,
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new(Arc::new(SystemHostResolver))
    }
}

impl ClientFactory {
    /// `host_resolver` resolves server host names (normally the bootstrap resolver).
    pub fn new(host_resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            host_resolver,
            proxies: None,
        }
    }

    pub fn with_proxies(mut self, proxies: Arc<dyn ProxyProvider>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    pub fn create(&self, ns: &NameServer) -> Result<Arc<dyn DnsClient>, DomainError> {
        let client = self.base_client(ns)?;
        debug!(server = %ns, "Upstream client created");
        Ok(transform(ns, client))
    }

    fn proxy(&self, ns: &NameServer) -> Result<Option<Arc<dyn ProxyAdapter>>, DomainError> {
        let Some(name) = &ns.proxy_name else {
            return Ok(None);
        };
        self.proxies
            .as_ref()
            .and_then(|p| p.proxy(name))
            .map(Some)
            .ok_or_else(|| {
                DomainError::InvalidNameServer(format!("{}: proxy '{}' not found", ns, name))
            })
    }

    fn dialer(&self, ns: &NameServer) -> Result<Dialer, DomainError> {
        Ok(Dialer::new(self.host_resolver.clone())
            .with_interface(ns.interface.clone())
            .with_proxy(self.proxy(ns)?))
    }

    fn base_client(&self, ns: &NameServer) -> Result<Arc<dyn DnsClient>, DomainError> {
        let address = ns.to_string();
        let server = || {
            ns.host_port()
                .map(|(host, port)| ServerAddr::new(host, port))
                .ok_or_else(|| DomainError::InvalidNameServer(address.clone()))
        };
        let skip_cert_verify = ns.param_enabled("skip-cert-verify");

        let client: Arc<dyn DnsClient> = match ns.net {
            NameServerNet::Udp => {
                let dialer = self.dialer(ns)?;
                if dialer.proxy().is_some() {
                    // Proxies only carry streams.
                    let transport = TcpTransport::new(server()?, dialer);
                    Arc::new(WireClient::new(address, Transport::Tcp(transport)))
                } else {
                    Arc::new(WireClient::udp(server()?, dialer))
                }
            }
            NameServerNet::Tcp => {
                let transport = TcpTransport::new(server()?, self.dialer(ns)?);
                Arc::new(WireClient::new(address, Transport::Tcp(transport)))
            }
            NameServerNet::Tls => self.tls_client(ns, server()?, skip_cert_verify)?,
            NameServerNet::Https => self.https_client(ns, server()?, skip_cert_verify)?,
            NameServerNet::Quic => self.quic_client(ns, server()?, skip_cert_verify)?,
            NameServerNet::Dhcp => Arc::new(DhcpClient::new(ns.addr.clone())),
            NameServerNet::System => Arc::new(SystemClient::new(self.dialer(ns)?)),
            NameServerNet::Rcode => Arc::new(RCodeClient::new(&ns.addr)?),
        };
        Ok(client)
    }

    #[cfg(feature = "dns-over-rustls")]
    fn tls_client(
        &self,
        ns: &NameServer,
        server: ServerAddr,
        skip_cert_verify: bool,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        use crate::dns::transport::tls::TlsTransport;
        let transport = TlsTransport::new(server, self.dialer(ns)?, skip_cert_verify)?;
        Ok(Arc::new(WireClient::new(ns.to_string(), Transport::Tls(transport))))
    }

    #[cfg(not(feature = "dns-over-rustls"))]
    fn tls_client(
        &self,
        ns: &NameServer,
        server: ServerAddr,
        _skip_cert_verify: bool,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        warn!(server = %ns, "TLS feature not enabled, falling back to TCP");
        let transport = TcpTransport::new(server, self.dialer(ns)?);
        Ok(Arc::new(WireClient::new(ns.to_string(), Transport::Tcp(transport))))
    }

    #[cfg(feature = "dns-over-https")]
    fn https_client(
        &self,
        ns: &NameServer,
        server: ServerAddr,
        skip_cert_verify: bool,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        use crate::dns::transport::https::HttpsTransport;

        #[cfg(feature = "dns-over-h3")]
        if ns.prefer_h3 {
            use crate::dns::transport::h3::H3Transport;
            let dialer = self.dialer(ns)?;
            if dialer.proxy().is_none() {
                let transport =
                    H3Transport::new(ns.addr.clone(), server, dialer, skip_cert_verify)?;
                return Ok(Arc::new(WireClient::new(ns.to_string(), Transport::H3(transport))));
            }
            warn!(server = %ns, "HTTP/3 is not available through a proxy, using HTTP/2");
        }

        let transport =
            HttpsTransport::new(ns.addr.clone(), server, self.dialer(ns)?, skip_cert_verify);
        Ok(Arc::new(WireClient::new(ns.to_string(), Transport::Https(transport))))
    }

    #[cfg(not(feature = "dns-over-https"))]
    fn https_client(
        &self,
        ns: &NameServer,
        _server: ServerAddr,
        _skip_cert_verify: bool,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        Err(DomainError::InvalidNameServer(format!(
            "{}: enable the 'dns-over-https' feature",
            ns
        )))
    }

    #[cfg(feature = "dns-over-quic")]
    fn quic_client(
        &self,
        ns: &NameServer,
        server: ServerAddr,
        skip_cert_verify: bool,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        use crate::dns::transport::quic::QuicTransport;
        let transport = QuicTransport::new(server, self.dialer(ns)?, skip_cert_verify)?;
        Ok(Arc::new(WireClient::new(ns.to_string(), Transport::Quic(transport))))
    }

    #[cfg(not(feature = "dns-over-quic"))]
    fn quic_client(
        &self,
        ns: &NameServer,
        _server: ServerAddr,
        _skip_cert_verify: bool,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        Err(DomainError::InvalidNameServer(format!(
            "{}: enable the 'dns-over-quic' feature",
            ns
        )))
    }
}

/// Wraps `client` in the decorators its parameters ask for: ECS first, then
/// disabled types. Without parameters the client is returned as is.
pub fn transform(ns: &NameServer, client: Arc<dyn DnsClient>) -> Arc<dyn DnsClient> {
    let mut client = client;

    if let Some(ecs) = ns.param("ecs").filter(|v| !v.is_empty()) {
        match parse_ecs(ecs) {
            Some(subnet) => {
                let override_existing = ns.param_enabled("ecs-override");
                debug!(server = %ns, ecs = %subnet, override_existing, "EDNS client subnet enabled");
                client = Arc::new(EdnsClientSubnetClient::new(client, subnet, override_existing));
            }
            None => warn!(server = %ns, ecs = %ecs, "Invalid ecs parameter, ignored"),
        }
    }

    let disabled = disabled_types(ns);
    if !disabled.is_empty() {
        client = Arc::new(DisableTypeClient::new(client, disabled));
    }

    client
}

/// Clients already built, keyed by their [`NameServer`].
///
/// Equal name servers share one client, across the resolver's server sets and
/// across rebuilds that hand the cache over.
#[derive(Clone, Default)]
pub struct ClientCache {
    entries: Arc<Mutex<Vec<(NameServer, Arc<dyn DnsClient>)>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        ns: &NameServer,
        factory: &ClientFactory,
    ) -> Result<Arc<dyn DnsClient>, DomainError> {
        if let Some((_, client)) = self.lock().iter().find(|(known, _)| known == ns) {
            return Ok(client.clone());
        }

        let client = factory.create(ns)?;
        let mut entries = self.lock();
        if let Some((_, existing)) = entries.iter().find(|(known, _)| known == ns) {
            return Ok(existing.clone());
        }
        entries.push((ns.clone(), client.clone()));
        Ok(client)
    }

    pub fn insert(&self, ns: NameServer, client: Arc<dyn DnsClient>) {
        let mut entries = self.lock();
        entries.retain(|(known, _)| known != &ns);
        entries.push((ns, client));
    }

    pub fn clients(&self) -> Vec<Arc<dyn DnsClient>> {
        self.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(NameServer, Arc<dyn DnsClient>)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
