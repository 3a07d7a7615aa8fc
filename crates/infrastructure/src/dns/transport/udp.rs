//! UDP Transport for DNS queries (RFC 1035 §4.2.1)
//!
//! Standard DNS transport. Messages are sent as-is (no framing), one socket
//! per query. Truncated answers are handed back untouched; the client decides
//! whether to retry over TCP.

use super::dialer::{Dialer, ServerAddr};
use super::{map_io_error, timeout_error, DnsTransport, TransportResponse};
use async_trait::async_trait;
use meta_dns_domain::DomainError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// DNS over UDP transport
pub struct UdpTransport {
    server: ServerAddr,
    dialer: Dialer,
}

impl UdpTransport {
    pub fn new(server: ServerAddr, dialer: Dialer) -> Self {
        Self { server, dialer }
    }

    pub fn server(&self) -> &ServerAddr {
        &self.server
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let deadline = Instant::now() + timeout;
        let server = self.server.to_string();
        let server_addr = tokio::time::timeout_at(deadline, self.dialer.resolve(&self.server))
            .await
            .map_err(|_| timeout_error(&server))??;

        let socket = self.dialer.bind_udp(server_addr)?;

        let bytes_sent = tokio::time::timeout_at(deadline, socket.send_to(message_bytes, server_addr))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))?;

        debug!(server = %server_addr, bytes_sent = bytes_sent, "UDP query sent");

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (bytes_received, from_addr) =
                tokio::time::timeout_at(deadline, socket.recv_from(&mut recv_buf))
                    .await
                    .map_err(|_| timeout_error(&server))?
                    .map_err(|e| map_io_error(&server, e))?;

            if from_addr != server_addr {
                warn!(
                    expected = %server_addr,
                    received_from = %from_addr,
                    "UDP response from unexpected source"
                );
                continue;
            }

            recv_buf.truncate(bytes_received);
            debug!(server = %server_addr, bytes_received = bytes_received, "UDP response received");

            return Ok(TransportResponse {
                bytes: recv_buf,
                protocol_used: "UDP",
            });
        }
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_udp_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..len].to_vec();
            reply.reverse();
            server.send_to(&reply, peer).await.unwrap();
        });

        let transport = UdpTransport::new(server_addr.into(), Dialer::default());
        let response = transport
            .send(&[1, 2, 3], Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.bytes, vec![3, 2, 1]);
        assert_eq!(response.protocol_used, "UDP");
    }

    #[tokio::test]
    async fn test_udp_timeout() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(silent.local_addr().unwrap().into(), Dialer::default());

        let err = transport
            .send(&[0; 12], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TransportTimeout { .. }));
    }
}
