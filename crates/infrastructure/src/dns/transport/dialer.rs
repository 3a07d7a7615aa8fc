//! Outbound connection setup shared by every upstream transport.
//!
//! A [`Dialer`] knows three things about a server: which interface to bind
//! (`SO_BINDTODEVICE`), which proxy adapter to go through, and how to turn a
//! host name into an address when the server was configured by name.

use super::{map_io_error, timeout_error};
use async_trait::async_trait;
use meta_dns_application::ports::{ProxyAdapter, ProxyStream};
use meta_dns_domain::name_server::join_host_port;
use meta_dns_domain::DomainError;
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpSocket, UdpSocket};
use tracing::debug;

/// Resolves upstream host names to addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, DomainError>;
}

/// Falls back to the operating system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostResolver;

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| DomainError::transport(host, format!("lookup failed: {}", e)))?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl From<SocketAddr> for ServerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

#[derive(Clone)]
pub struct Dialer {
    interface: Option<String>,
    proxy: Option<Arc<dyn ProxyAdapter>>,
    resolver: Arc<dyn HostResolver>,
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new(Arc::new(SystemHostResolver))
    }
}

impl fmt::Debug for Dialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialer")
            .field("interface", &self.interface)
            .field("proxy", &self.proxy.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl Dialer {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            interface: None,
            proxy: None,
            resolver,
        }
    }

    pub fn with_interface(mut self, interface: Option<String>) -> Self {
        self.interface = interface.filter(|i| !i.is_empty());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<Arc<dyn ProxyAdapter>>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn proxy(&self) -> Option<&Arc<dyn ProxyAdapter>> {
        self.proxy.as_ref()
    }

    /// Picks the first IPv4 result, or the first result when only IPv6 exists.
    pub async fn resolve(&self, addr: &ServerAddr) -> Result<SocketAddr, DomainError> {
        if let Some(ip) = addr.ip() {
            return Ok(SocketAddr::new(ip, addr.port));
        }

        let ips = self.resolver.resolve_host(&addr.host).await?;
        let ip = ips
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| ips.first())
            .copied()
            .ok_or_else(|| DomainError::transport(addr.to_string(), "no address for host"))?;

        debug!(server = %addr, resolved = %ip, "Upstream host resolved");
        Ok(SocketAddr::new(ip, addr.port))
    }

    pub async fn dial_tcp(
        &self,
        addr: &ServerAddr,
        timeout: Duration,
    ) -> Result<Box<dyn ProxyStream>, DomainError> {
        let server = addr.to_string();

        if let Some(proxy) = &self.proxy {
            let stream = tokio::time::timeout(timeout, proxy.dial_tcp(&addr.host, addr.port))
                .await
                .map_err(|_| timeout_error(&server))?
                .map_err(|e| map_io_error(&server, e))?;
            debug!(server = %server, proxy = %proxy.name(), "TCP connection via proxy");
            return Ok(stream);
        }

        let target = self.resolve(addr).await?;
        let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| map_io_error(&server, e))?;
        self.prepare(&socket).map_err(|e| map_io_error(&server, e))?;
        socket
            .set_tcp_nodelay(true)
            .map_err(|e| map_io_error(&server, e))?;

        let socket = TcpSocket::from_std_stream(socket.into());
        let stream = tokio::time::timeout(timeout, socket.connect(target))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))?;

        Ok(Box::new(stream))
    }

    /// Binds an unconnected UDP socket whose family matches `remote`.
    pub fn bind_udp(&self, remote: SocketAddr) -> Result<UdpSocket, DomainError> {
        let socket = self.bind_std_udp(remote)?;
        UdpSocket::from_std(socket).map_err(|e| map_io_error(&remote.to_string(), e))
    }

    pub fn bind_std_udp(&self, remote: SocketAddr) -> Result<std::net::UdpSocket, DomainError> {
        let server = remote.to_string();
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = Socket::new(Domain::for_address(remote), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| map_io_error(&server, e))?;
        self.prepare(&socket).map_err(|e| map_io_error(&server, e))?;
        socket
            .bind(&local.into())
            .map_err(|e| map_io_error(&server, e))?;
        Ok(socket.into())
    }

    fn prepare(&self, socket: &Socket) -> std::io::Result<()> {
        socket.set_nonblocking(true)?;
        if let Some(interface) = &self.interface {
            bind_to_device(socket, interface)?;
        }
        Ok(())
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
fn bind_to_device(socket: &Socket, interface: &str) -> std::io::Result<()> {
    socket.bind_device(Some(interface.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
fn bind_to_device(_socket: &Socket, interface: &str) -> std::io::Result<()> {
    tracing::warn!(interface = %interface, "Interface binding is not supported on this platform");
    Ok(())
}
