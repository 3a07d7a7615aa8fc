//! `dhcp://<iface>`: asks the DHCP server on an interface which DNS servers to use.
//!
//! A DHCPINFORM is broadcast from the interface's address and option 6
//! (Domain Name Server) is read from the ACK. The answer is cached for an hour.

use crate::dns::batch::batch_exchange;
use crate::dns::transport::{Dialer, ServerAddr};
use async_trait::async_trait;
use dhcproto::{v4, Decodable, Decoder, Encodable, Encoder};
use hickory_proto::op::Message;
use meta_dns_application::ports::DnsClient;
use meta_dns_domain::DomainError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::wire::WireClient;

pub const DHCP_TTL: Duration = Duration::from_secs(60 * 60);
pub const DHCP_TIMEOUT: Duration = Duration::from_secs(10);

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;

struct DhcpServers {
    servers: Vec<Ipv4Addr>,
    clients: Vec<Arc<dyn DnsClient>>,
    resolved_at: Option<Instant>,
}

pub struct DhcpClient {
    interface: String,
    state: Mutex<DhcpServers>,
}

impl DhcpClient {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            state: Mutex::new(DhcpServers {
                servers: Vec::new(),
                clients: Vec::new(),
                resolved_at: None,
            }),
        }
    }

    async fn clients(&self) -> Result<Vec<Arc<dyn DnsClient>>, DomainError> {
        let mut state = self.state.lock().await;

        let fresh = state
            .resolved_at
            .is_some_and(|at| at.elapsed() < DHCP_TTL);
        if fresh && !state.clients.is_empty() {
            return Ok(state.clients.clone());
        }

        let servers = discover_dns_servers(&self.interface, DHCP_TIMEOUT).await?;
        if servers.is_empty() {
            return Err(DomainError::transport(
                self.address(),
                "DHCP server offered no DNS servers",
            ));
        }

        if servers != state.servers {
            info!(interface = %self.interface, servers = ?servers, "DNS servers from DHCP");
            let dialer = Dialer::default().with_interface(Some(self.interface.clone()));
            state.clients = servers
                .iter()
                .map(|ip| {
                    Arc::new(WireClient::udp(
                        ServerAddr::new(ip.to_string(), 53),
                        dialer.clone(),
                    )) as Arc<dyn DnsClient>
                })
                .collect();
            state.servers = servers;
        }
        state.resolved_at = Some(Instant::now());
        Ok(state.clients.clone())
    }
}

#[async_trait]
impl DnsClient for DhcpClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        let clients = self.clients().await?;
        Ok(batch_exchange(&clients, msg).await?.message)
    }

    fn address(&self) -> String {
        format!("dhcp://{}", self.interface)
    }

    async fn close(&self) {
        let clients = std::mem::take(&mut self.state.lock().await.clients);
        for client in clients {
            client.close().await;
        }
    }
}

async fn discover_dns_servers(
    interface: &str,
    timeout: Duration,
) -> Result<Vec<Ipv4Addr>, DomainError> {
    let server = format!("dhcp://{}", interface);
    let io_err = |e: std::io::Error| DomainError::transport(&server, e);

    let local_ip = interface_ipv4(interface).map_err(io_err)?;
    let mac = interface_mac(interface);
    let xid = fastrand::u32(..);

    let socket = client_socket(interface).map_err(io_err)?;
    let packet = build_inform(xid, &mac, local_ip)?;
    socket
        .send_to(
            &packet,
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_SERVER_PORT),
        )
        .await
        .map_err(io_err)?;
    debug!(interface = %interface, xid = xid, local_ip = %local_ip, "Sent DHCPINFORM");

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 1500];
    loop {
        let (n, from) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.clone(),
            })?
            .map_err(io_err)?;

        match parse_dns_servers(&buf[..n], xid) {
            Some(servers) => return Ok(servers),
            None => debug!(interface = %interface, from = %from, "Ignored unrelated DHCP packet"),
        }
    }
}

/// Encodes a DHCPINFORM asking for option 6.
pub fn build_inform(xid: u32, mac: &[u8], client_ip: Ipv4Addr) -> Result<Vec<u8>, DomainError> {
    let mut packet = v4::Message::default();
    packet.set_xid(xid);
    packet.set_flags(v4::Flags::default().set_broadcast());
    packet.set_ciaddr(client_ip);
    packet.set_chaddr(mac);

    packet
        .opts_mut()
        .insert(v4::DhcpOption::MessageType(v4::MessageType::Inform));
    packet
        .opts_mut()
        .insert(v4::DhcpOption::ParameterRequestList(vec![
            v4::OptionCode::DomainNameServer,
        ]));

    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf);
    packet
        .encode(&mut encoder)
        .map_err(|e| DomainError::IoError(format!("failed to encode DHCPINFORM: {}", e)))?;
    Ok(buf)
}

/// DNS servers from a DHCPACK answering `xid`, `None` for anything else.
pub fn parse_dns_servers(packet: &[u8], xid: u32) -> Option<Vec<Ipv4Addr>> {
    let mut decoder = Decoder::new(packet);
    let msg = match v4::Message::decode(&mut decoder) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "Failed to decode DHCP packet");
            return None;
        }
    };

    if msg.xid() != xid {
        return None;
    }
    match msg.opts().get(v4::OptionCode::MessageType) {
        Some(v4::DhcpOption::MessageType(v4::MessageType::Ack)) => {}
        _ => return None,
    }
    match msg.opts().get(v4::OptionCode::DomainNameServer) {
        Some(v4::DhcpOption::DomainNameServer(servers)) => Some(servers.clone()),
        _ => Some(Vec::new()),
    }
}

fn client_socket(interface: &str) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    bind_to_device(&socket, interface)?;
    let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, DHCP_CLIENT_PORT));
    socket.bind(&local.into())?;
    UdpSocket::from_std(socket.into())
}

/// Source address the kernel picks for a broadcast leaving `interface`.
fn interface_ipv4(interface: &str) -> std::io::Result<Ipv4Addr> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    bind_to_device(&socket, interface)?;
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, DHCP_SERVER_PORT));
    socket.connect(&target.into())?;

    match socket.local_addr()?.as_socket() {
        Some(SocketAddr::V4(addr)) if !addr.ip().is_unspecified() => Ok(*addr.ip()),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("interface {} has no IPv4 address", interface),
        )),
    }
}

/// Hardware address from sysfs; zeroes when it cannot be read.
fn interface_mac(interface: &str) -> Vec<u8> {
    std::fs::read_to_string(format!("/sys/class/net/{}/address", interface))
        .ok()
        .and_then(|raw| {
            raw.trim()
                .split(':')
                .map(|octet| u8::from_str_radix(octet, 16).ok())
                .collect::<Option<Vec<u8>>>()
        })
        .filter(|mac| mac.len() == 6)
        .unwrap_or_else(|| vec![0; 6])
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
fn bind_to_device(socket: &Socket, interface: &str) -> std::io::Result<()> {
    socket.bind_device(Some(interface.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
fn bind_to_device(_socket: &Socket, interface: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot bind DHCP probe to {} on this platform", interface),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(xid: u32, servers: Vec<Ipv4Addr>) -> Vec<u8> {
        let mut packet = v4::Message::default();
        packet.set_xid(xid);
        packet
            .opts_mut()
            .insert(v4::DhcpOption::MessageType(v4::MessageType::Ack));
        packet
            .opts_mut()
            .insert(v4::DhcpOption::DomainNameServer(servers));
        let mut buf = Vec::new();
        packet.encode(&mut Encoder::new(&mut buf)).unwrap();
        buf
    }

    #[test]
    fn test_inform_carries_request() {
        let bytes = build_inform(42, &[2, 0, 0, 0, 0, 1], Ipv4Addr::new(192, 168, 1, 20)).unwrap();
        let msg = v4::Message::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(msg.xid(), 42);
        assert_eq!(msg.ciaddr(), Ipv4Addr::new(192, 168, 1, 20));
        assert!(matches!(
            msg.opts().get(v4::OptionCode::MessageType),
            Some(v4::DhcpOption::MessageType(v4::MessageType::Inform))
        ));
    }

    #[test]
    fn test_parse_ack() {
        let servers = vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(1, 1, 1, 1)];
        assert_eq!(parse_dns_servers(&ack(7, servers.clone()), 7), Some(servers));
    }

    #[test]
    fn test_ignores_other_transactions() {
        assert_eq!(parse_dns_servers(&ack(7, vec![Ipv4Addr::LOCALHOST]), 8), None);
        assert_eq!(parse_dns_servers(&[1, 2, 3], 7), None);
    }

    #[test]
    fn test_address() {
        assert_eq!(DhcpClient::new("eth0").address(), "dhcp://eth0");
    }
}
