//! TLS Transport for DNS queries: DNS-over-TLS (RFC 7858)
//!
//! Each transport owns its `ClientConfig` (session resumption enabled) and a
//! small LIFO pool of idle TLS streams. A pooled stream that fails is dropped
//! and the query is retried once on a fresh connection.

use super::dialer::{Dialer, ServerAddr};
use super::pool::{ConnectionPool, PooledConnection, MAX_IDLE_CONNECTIONS};
use super::tcp::{read_with_length_prefix, send_with_length_prefix};
use super::{map_io_error, timeout_error, tls_config, DnsTransport, TransportResponse};
use async_trait::async_trait;
use futures::future::BoxFuture;
use meta_dns_application::ports::ProxyStream;
use meta_dns_domain::DomainError;
use rustls::pki_types::ServerName;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

type DotStream = TlsStream<Box<dyn ProxyStream>>;

impl PooledConnection for DotStream {
    fn shutdown(mut self) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = AsyncWriteExt::shutdown(&mut self).await;
        })
    }
}

/// DNS-over-TLS transport (RFC 7858)
pub struct TlsTransport {
    server: ServerAddr,
    server_name: ServerName<'static>,
    dialer: Dialer,
    connector: TlsConnector,
    pool: ConnectionPool<DotStream>,
}

impl TlsTransport {
    pub fn new(
        server: ServerAddr,
        dialer: Dialer,
        skip_cert_verify: bool,
    ) -> Result<Self, DomainError> {
        let server_name = ServerName::try_from(server.host.clone()).map_err(|e| {
            DomainError::InvalidNameServer(format!("invalid TLS host '{}': {}", server.host, e))
        })?;

        Ok(Self {
            connector: TlsConnector::from(tls_config::client_config(skip_cert_verify, &[])),
            server,
            server_name,
            dialer,
            pool: ConnectionPool::new(MAX_IDLE_CONNECTIONS),
        })
    }

    pub fn idle_connections(&self) -> usize {
        self.pool.len()
    }

    /// Establish a new TLS connection (TCP connect + TLS handshake).
    async fn connect_new(&self, timeout: Duration) -> Result<DotStream, DomainError> {
        let server = self.server.to_string();
        let tcp_stream = self.dialer.dial_tcp(&self.server, timeout).await?;

        let tls_stream = tokio::time::timeout(
            timeout,
            self.connector.connect(self.server_name.clone(), tcp_stream),
        )
        .await
        .map_err(|_| timeout_error(&server))?
        .map_err(|e| DomainError::transport(&server, format!("TLS handshake failed: {}", e)))?;

        debug!(server = %server, "TLS connection established");
        Ok(tls_stream)
    }

    async fn send_on_stream(
        &self,
        stream: &mut DotStream,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let server = self.server.to_string();

        tokio::time::timeout(timeout, send_with_length_prefix(stream, message_bytes))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))?;

        tokio::time::timeout(timeout, read_with_length_prefix(stream))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        if let Some(mut stream) = self.pool.take() {
            match self.send_on_stream(&mut stream, message_bytes, timeout).await {
                Ok(response_bytes) => {
                    debug!(server = %self.server, "TLS query via pooled connection");
                    self.pool.put(stream);
                    return Ok(TransportResponse {
                        bytes: response_bytes,
                        protocol_used: "TLS",
                    });
                }
                Err(e) => {
                    debug!(server = %self.server, error = %e, "Pooled TLS connection stale, reconnecting");
                }
            }
        }

        let mut stream = self.connect_new(timeout).await?;
        let response_bytes = self
            .send_on_stream(&mut stream, message_bytes, timeout)
            .await?;

        debug!(
            server = %self.server,
            response_len = response_bytes.len(),
            "TLS response received"
        );

        self.pool.put(stream);

        Ok(TransportResponse {
            bytes: response_bytes,
            protocol_used: "TLS",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TLS"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
