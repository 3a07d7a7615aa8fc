//! HTTPS Transport for DNS queries: DNS-over-HTTPS (RFC 8484)
//!
//! Sends DNS queries as HTTP POST requests with `application/dns-message` content type.
//! The request body is the raw DNS wire format message, and the response body
//! contains the raw DNS wire format response.
//!
//! Wire format (HTTP):
//! ```text
//! POST /dns-query HTTP/2
//! Content-Type: application/dns-message
//! Accept: application/dns-message
//!
//! <raw DNS message bytes>
//! ```

use super::dialer::{Dialer, ServerAddr};
use super::{timeout_error, DnsTransport, TransportResponse};
use async_trait::async_trait;
use meta_dns_domain::DomainError;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Expected content type for DNS-over-HTTPS responses (RFC 8484 §4.2.1)
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// DNS-over-HTTPS transport (RFC 8484)
pub struct HttpsTransport {
    url: String,
    server: ServerAddr,
    dialer: Dialer,
    skip_cert_verify: bool,
    client: OnceCell<reqwest::Client>,
}

impl HttpsTransport {
    pub fn new(url: String, server: ServerAddr, dialer: Dialer, skip_cert_verify: bool) -> Self {
        Self {
            url,
            server,
            dialer,
            skip_cert_verify,
            client: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The HTTP client is built on first use so the server host can be
    /// resolved through the bootstrap resolver instead of the system one.
    async fn client(&self) -> Result<&reqwest::Client, DomainError> {
        self.client.get_or_try_init(|| self.build_client()).await
    }

    async fn build_client(&self) -> Result<reqwest::Client, DomainError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(4)
            .http2_prior_knowledge()
            .danger_accept_invalid_certs(self.skip_cert_verify);

        match self.dialer.proxy() {
            Some(proxy) => {
                let Some(proxy_url) = proxy.http_proxy_url() else {
                    return Err(DomainError::transport(
                        &self.url,
                        format!("proxy '{}' cannot carry HTTP traffic", proxy.name()),
                    ));
                };
                let proxy = reqwest::Proxy::all(&proxy_url)
                    .map_err(|e| DomainError::transport(&self.url, e))?;
                builder = builder.proxy(proxy);
            }
            None => {
                builder = builder.no_proxy();
                if self.server.ip().is_none() {
                    let addr = self.dialer.resolve(&self.server).await?;
                    builder = builder.resolve(&self.server.host, addr);
                }
                #[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
                if let Some(interface) = self.dialer.interface() {
                    builder = builder.interface(interface);
                }
            }
        }

        builder
            .build()
            .map_err(|e| DomainError::transport(&self.url, format!("HTTP client: {}", e)))
    }
}

#[async_trait]
impl DnsTransport for HttpsTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        debug!(url = %self.url, message_len = message_bytes.len(), "Sending DoH query");

        let client = tokio::time::timeout(timeout, self.client())
            .await
            .map_err(|_| timeout_error(&self.url))??;

        // POST with application/dns-message (RFC 8484 §4.1)
        let response = tokio::time::timeout(
            timeout,
            client
                .post(&self.url)
                .header("Content-Type", DNS_MESSAGE_CONTENT_TYPE)
                .header("Accept", DNS_MESSAGE_CONTENT_TYPE)
                .body(message_bytes.to_vec())
                .send(),
        )
        .await
        .map_err(|_| timeout_error(&self.url))?
        .map_err(|e| DomainError::transport(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::transport(
                &self.url,
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let response_bytes = tokio::time::timeout(timeout, response.bytes())
            .await
            .map_err(|_| timeout_error(&self.url))?
            .map_err(|e| DomainError::transport(&self.url, e))?;

        debug!(url = %self.url, response_len = response_bytes.len(), "DoH response received");

        Ok(TransportResponse {
            bytes: response_bytes.to_vec(),
            protocol_used: "HTTPS",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "HTTPS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_transport_creation() {
        let transport = HttpsTransport::new(
            "https://1.1.1.1:443/dns-query".to_string(),
            ServerAddr::new("1.1.1.1", 443),
            Dialer::default(),
            false,
        );
        assert_eq!(transport.url(), "https://1.1.1.1:443/dns-query");
        assert_eq!(transport.protocol_name(), "HTTPS");
    }

    #[tokio::test]
    async fn test_client_builds_for_literal_host() {
        let transport = HttpsTransport::new(
            "https://1.1.1.1:443/dns-query".to_string(),
            ServerAddr::new("1.1.1.1", 443),
            Dialer::default(),
            true,
        );
        assert!(transport.client().await.is_ok());
    }
}
