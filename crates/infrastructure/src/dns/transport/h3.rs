use super::dialer::{Dialer, ServerAddr};
use super::{map_io_error, timeout_error, tls_config, DnsTransport, TransportResponse};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use meta_dns_domain::DomainError;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

type H3SendRequest = h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>;

/// DNS-over-HTTPS carried over HTTP/3. Selected when a DoH server has `h3=true`.
///
/// One multiplexed connection is kept; it is replaced after a failed request.
pub struct H3Transport {
    url: String,
    server: ServerAddr,
    dialer: Dialer,
    client_config: quinn::ClientConfig,
    endpoint: OnceCell<quinn::Endpoint>,
    connection: Mutex<Option<H3SendRequest>>,
}

impl H3Transport {
    pub fn new(
        url: String,
        server: ServerAddr,
        dialer: Dialer,
        skip_cert_verify: bool,
    ) -> Result<Self, DomainError> {
        if let Some(proxy) = dialer.proxy() {
            return Err(DomainError::InvalidNameServer(format!(
                "{} over HTTP/3 cannot be reached through proxy '{}'",
                url,
                proxy.name()
            )));
        }

        let tls = tls_config::client_config(skip_cert_verify, &[b"h3"]);
        let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
            .map_err(|e| DomainError::InvalidNameServer(format!("H3 TLS config: {}", e)))?;

        Ok(Self {
            url,
            server,
            dialer,
            client_config: quinn::ClientConfig::new(Arc::new(quic_config)),
            endpoint: OnceCell::new(),
            connection: Mutex::new(None),
        })
    }

    async fn endpoint(&self, server_addr: SocketAddr) -> Result<&quinn::Endpoint, DomainError> {
        self.endpoint
            .get_or_try_init(|| async {
                let socket = self.dialer.bind_std_udp(server_addr)?;
                let mut endpoint = quinn::Endpoint::new(
                    quinn::EndpointConfig::default(),
                    None,
                    socket,
                    Arc::new(quinn::TokioRuntime),
                )
                .map_err(|e| map_io_error(&self.url, e))?;
                endpoint.set_default_client_config(self.client_config.clone());
                Ok(endpoint)
            })
            .await
    }

    fn cached(&self) -> Option<H3SendRequest> {
        self.lock().clone()
    }

    fn store(&self, send_request: Option<H3SendRequest>) {
        *self.lock() = send_request;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<H3SendRequest>> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn connect_new(&self, timeout: Duration) -> Result<H3SendRequest, DomainError> {
        let server_addr = self.dialer.resolve(&self.server).await?;
        let endpoint = self.endpoint(server_addr).await?;

        let connecting = endpoint
            .connect(server_addr, &self.server.host)
            .map_err(|e| DomainError::transport(&self.url, e))?;

        let quinn_conn = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| timeout_error(&self.url))?
            .map_err(|e| DomainError::TransportConnectionRefused {
                server: format!("{}: {}", self.url, e),
            })?;

        let h3_conn = h3_quinn::Connection::new(quinn_conn);
        let (mut driver, send_request) = h3::client::new(h3_conn)
            .await
            .map_err(|e| DomainError::transport(&self.url, format!("H3 setup: {}", e)))?;

        tokio::spawn(async move {
            let _ = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
        });

        debug!(url = %self.url, "H3 connection established");
        Ok(send_request)
    }

    async fn execute_request(
        &self,
        send_request: &mut H3SendRequest,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Bytes, DomainError> {
        let url = self.url.as_str();
        let request = http::Request::builder()
            .method("POST")
            .uri(url)
            .header("content-type", "application/dns-message")
            .header("accept", "application/dns-message")
            .body(())
            .map_err(|e| DomainError::transport(url, e))?;

        let exchange = async {
            let mut stream = send_request
                .send_request(request)
                .await
                .map_err(|e| DomainError::transport(url, e))?;
            stream
                .send_data(Bytes::copy_from_slice(message_bytes))
                .await
                .map_err(|e| DomainError::transport(url, e))?;
            stream
                .finish()
                .await
                .map_err(|e| DomainError::transport(url, e))?;

            let response = stream
                .recv_response()
                .await
                .map_err(|e| DomainError::transport(url, e))?;
            if !response.status().is_success() {
                return Err(DomainError::transport(
                    url,
                    format!("HTTP {}", response.status().as_u16()),
                ));
            }

            let mut body = BytesMut::new();
            while let Some(mut chunk) = stream
                .recv_data()
                .await
                .map_err(|e| DomainError::transport(url, e))?
            {
                body.extend_from_slice(chunk.chunk());
                chunk.advance(chunk.remaining());
            }
            Ok(body.freeze())
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| timeout_error(url))?
    }
}

#[async_trait]
impl DnsTransport for H3Transport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        if let Some(mut send_request) = self.cached() {
            match self
                .execute_request(&mut send_request, message_bytes, timeout)
                .await
            {
                Ok(response_bytes) => {
                    debug!(url = %self.url, "DoH3 query via pooled connection");
                    return Ok(TransportResponse {
                        bytes: response_bytes.to_vec(),
                        protocol_used: "H3",
                    });
                }
                Err(e) => {
                    self.store(None);
                    debug!(url = %self.url, error = %e, "H3 connection stale, reconnecting");
                }
            }
        }

        let mut fresh_request = self.connect_new(timeout).await?;
        self.store(Some(fresh_request.clone()));

        let response_bytes = self
            .execute_request(&mut fresh_request, message_bytes, timeout)
            .await?;

        debug!(
            url = %self.url,
            response_len = response_bytes.len(),
            "DoH3 response received"
        );

        Ok(TransportResponse {
            bytes: response_bytes.to_vec(),
            protocol_used: "H3",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "H3"
    }

    async fn close(&self) {
        self.store(None);
        if let Some(endpoint) = self.endpoint.get() {
            endpoint.close(0u32.into(), b"");
        }
    }
}
