pub mod dialer;
#[cfg(feature = "dns-over-h3")]
pub mod h3;
#[cfg(feature = "dns-over-https")]
pub mod https;
pub mod pool;
#[cfg(feature = "dns-over-quic")]
pub mod quic;
pub mod tcp;
#[cfg(feature = "dns-over-rustls")]
pub mod tls;
#[cfg(any(
    feature = "dns-over-rustls",
    feature = "dns-over-quic",
    feature = "dns-over-h3"
))]
pub mod tls_config;
pub mod udp;

use async_trait::async_trait;
use meta_dns_domain::DomainError;
use std::io;
use std::time::Duration;

pub use dialer::{Dialer, HostResolver, ServerAddr, SystemHostResolver};
pub use pool::{ConnectionPool, PooledConnection, MAX_IDLE_CONNECTIONS};

#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: Vec<u8>,

    pub protocol_used: &'static str,
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError>;

    fn protocol_name(&self) -> &'static str;

    /// Releases pooled connections. Transports without state keep the default.
    async fn close(&self) {}
}

pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
    #[cfg(feature = "dns-over-rustls")]
    Tls(tls::TlsTransport),
    #[cfg(feature = "dns-over-https")]
    Https(https::HttpsTransport),
    #[cfg(feature = "dns-over-h3")]
    H3(h3::H3Transport),
    #[cfg(feature = "dns-over-quic")]
    Quic(quic::QuicTransport),
}

impl Transport {
    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        match self {
            Self::Udp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Tcp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-h3")]
            Self::H3(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(t) => DnsTransport::send(t, message_bytes, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(_) => "TLS",
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => "HTTPS",
            #[cfg(feature = "dns-over-h3")]
            Self::H3(_) => "H3",
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(_) => "QUIC",
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Udp(t) => DnsTransport::close(t).await,
            Self::Tcp(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-h3")]
            Self::H3(t) => DnsTransport::close(t).await,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(t) => DnsTransport::close(t).await,
        }
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Self::Udp(_))
    }

    /// DoH and DoQ put message ID 0 on the wire (RFC 8484 §4.1, RFC 9250 §4.2.1).
    pub fn zero_message_id(&self) -> bool {
        match self {
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => true,
            #[cfg(feature = "dns-over-h3")]
            Self::H3(_) => true,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(_) => true,
            _ => false,
        }
    }
}

pub(crate) fn map_io_error(server: &str, err: io::Error) -> DomainError {
    match err.kind() {
        io::ErrorKind::TimedOut => DomainError::TransportTimeout {
            server: server.to_string(),
        },
        io::ErrorKind::ConnectionRefused => DomainError::TransportConnectionRefused {
            server: server.to_string(),
        },
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            DomainError::TransportConnectionReset {
                server: server.to_string(),
            }
        }
        _ => DomainError::transport(server, err),
    }
}

pub(crate) fn timeout_error(server: &str) -> DomainError {
    DomainError::TransportTimeout {
        server: server.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let refused = map_io_error("1.1.1.1:53", io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(matches!(refused, DomainError::TransportConnectionRefused { .. }));

        let reset = map_io_error("1.1.1.1:53", io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(reset, DomainError::TransportConnectionReset { .. }));

        let other = map_io_error("1.1.1.1:53", io::Error::other("boom"));
        assert_eq!(
            other.to_string(),
            "Transport error from 1.1.1.1:53: boom"
        );
    }
}
