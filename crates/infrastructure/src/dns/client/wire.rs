use crate::dns::transport::tcp::TcpTransport;
use crate::dns::transport::udp::UdpTransport;
use crate::dns::transport::{Dialer, ServerAddr};
use crate::dns::transport::{DnsTransport, Transport};
use async_trait::async_trait;
use hickory_proto::op::Message;
use meta_dns_application::ports::DnsClient;
use meta_dns_domain::DomainError;
use std::time::Duration;
use tracing::debug;

use super::DEFAULT_DNS_TIMEOUT;

/// Client for servers spoken to in DNS wire format (UDP, TCP, DoT, DoH, DoQ).
pub struct WireClient {
    address: String,
    transport: Transport,
    /// Used once when a UDP answer comes back truncated.
    tcp_retry: Option<TcpTransport>,
    timeout: Duration,
}

impl WireClient {
    pub fn new(address: impl Into<String>, transport: Transport) -> Self {
        Self {
            address: address.into(),
            transport,
            tcp_retry: None,
            timeout: DEFAULT_DNS_TIMEOUT,
        }
    }

    /// Plain DNS over UDP with the truncation retry wired to the same server.
    pub fn udp(server: ServerAddr, dialer: Dialer) -> Self {
        let address = format!("udp://{}", server);
        let tcp = TcpTransport::new(server.clone(), dialer.clone());
        Self::new(address, Transport::Udp(UdpTransport::new(server, dialer))).with_tcp_retry(tcp)
    }

    pub fn with_tcp_retry(mut self, tcp: TcpTransport) -> Self {
        self.tcp_retry = Some(tcp);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn protocol_name(&self) -> &'static str {
        self.transport.protocol_name()
    }

    fn decode(&self, bytes: &[u8], expected_id: u16) -> Result<Message, DomainError> {
        let response = Message::from_vec(bytes).map_err(|e| {
            DomainError::InvalidDnsResponse(format!("{} sent undecodable response: {}", self.address, e))
        })?;

        if response.id() != expected_id {
            return Err(DomainError::InvalidDnsResponse(format!(
                "{} answered id {} for query id {}",
                self.address,
                response.id(),
                expected_id
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl DnsClient for WireClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        let original_id = msg.id();
        let mut query = msg.clone();
        if self.transport.zero_message_id() {
            query.set_id(0);
        }
        let wire_id = query.id();

        let bytes = query
            .to_vec()
            .map_err(|e| DomainError::InvalidDnsResponse(format!("failed to encode query: {}", e)))?;

        let sent = self.transport.send(&bytes, self.timeout).await?;
        let mut response = self.decode(&sent.bytes, wire_id)?;

        if response.truncated() && self.transport.is_udp() {
            if let Some(tcp) = &self.tcp_retry {
                debug!(server = %self.address, "Truncated UDP response, retrying over TCP");
                let retried = tcp.send(&bytes, self.timeout).await?;
                response = self.decode(&retried.bytes, wire_id)?;
            }
        }

        response.set_id(original_id);
        Ok(response)
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn close(&self) {
        self.transport.close().await;
    }
}
