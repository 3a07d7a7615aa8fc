use super::dialer::{Dialer, ServerAddr};
use super::pool::{ConnectionPool, PooledConnection, MAX_IDLE_CONNECTIONS};
use super::tcp::{read_with_length_prefix, send_with_length_prefix};
use super::{map_io_error, timeout_error, tls_config, DnsTransport, TransportResponse};
use async_trait::async_trait;
use futures::future::BoxFuture;
use meta_dns_domain::DomainError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

/// RFC 9250 §4.3 "DOQ_NO_ERROR".
const DOQ_NO_ERROR: u32 = 0;

impl PooledConnection for quinn::Connection {
    fn shutdown(self) -> BoxFuture<'static, ()> {
        self.close(DOQ_NO_ERROR.into(), b"");
        Box::pin(futures::future::ready(()))
    }
}

/// DNS-over-QUIC transport (RFC 9250). One bidirectional stream per query
/// over pooled connections.
pub struct QuicTransport {
    server: ServerAddr,
    dialer: Dialer,
    client_config: quinn::ClientConfig,
    endpoint: OnceCell<quinn::Endpoint>,
    pool: ConnectionPool<quinn::Connection>,
}

impl QuicTransport {
    pub fn new(
        server: ServerAddr,
        dialer: Dialer,
        skip_cert_verify: bool,
    ) -> Result<Self, DomainError> {
        if let Some(proxy) = dialer.proxy() {
            return Err(DomainError::InvalidNameServer(format!(
                "quic://{} cannot be reached through proxy '{}'",
                server,
                proxy.name()
            )));
        }

        let tls = tls_config::client_config(skip_cert_verify, &[b"doq"]);
        let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
            .map_err(|e| DomainError::InvalidNameServer(format!("QUIC TLS config: {}", e)))?;

        Ok(Self {
            server,
            dialer,
            client_config: quinn::ClientConfig::new(Arc::new(quic_config)),
            endpoint: OnceCell::new(),
            pool: ConnectionPool::new(MAX_IDLE_CONNECTIONS),
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
                .map_err(|e| map_io_error(&self.server.to_string(), e))?;
                endpoint.set_default_client_config(self.client_config.clone());
                Ok(endpoint)
            })
            .await
    }

    async fn connect_new(&self, timeout: Duration) -> Result<quinn::Connection, DomainError> {
        let server = self.server.to_string();
        let server_addr = self.dialer.resolve(&self.server).await?;
        let endpoint = self.endpoint(server_addr).await?;

        let connecting = endpoint
            .connect(server_addr, &self.server.host)
            .map_err(|e| DomainError::transport(&server, e))?;

        let conn = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| DomainError::TransportConnectionRefused {
                server: format!("{}: {}", server, e),
            })?;

        debug!(server = %server, "QUIC connection established");
        Ok(conn)
    }

    /// Live pooled connection, skipping any the peer already closed.
    fn take_live(&self) -> Option<quinn::Connection> {
        while let Some(conn) = self.pool.take() {
            if conn.close_reason().is_none() {
                return Some(conn);
            }
        }
        None
    }

    async fn send_on_stream(
        &self,
        conn: &quinn::Connection,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let server = self.server.to_string();
        let deadline = Instant::now() + timeout;

        let (mut send_stream, mut recv_stream) = tokio::time::timeout_at(deadline, conn.open_bi())
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| DomainError::transport(&server, format!("open stream: {}", e)))?;

        tokio::time::timeout_at(deadline, send_with_length_prefix(&mut send_stream, message_bytes))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))?;

        send_stream
            .finish()
            .map_err(|e| DomainError::transport(&server, format!("finish stream: {}", e)))?;

        tokio::time::timeout_at(deadline, read_with_length_prefix(&mut recv_stream))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))
    }
}

#[async_trait]
impl DnsTransport for QuicTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        if let Some(conn) = self.take_live() {
            match self.send_on_stream(&conn, message_bytes, timeout).await {
                Ok(response_bytes) => {
                    debug!(server = %self.server, "QUIC query via pooled connection");
                    self.pool.put(conn);
                    return Ok(TransportResponse {
                        bytes: response_bytes,
                        protocol_used: "QUIC",
                    });
                }
                Err(e) => {
                    debug!(server = %self.server, error = %e, "QUIC connection stale, reconnecting");
                    conn.close(DOQ_NO_ERROR.into(), b"");
                }
            }
        }

        let conn = self.connect_new(timeout).await?;
        let response_bytes = self.send_on_stream(&conn, message_bytes, timeout).await?;

        debug!(
            server = %self.server,
            response_len = response_bytes.len(),
            "QUIC response received"
        );

        self.pool.put(conn);

        Ok(TransportResponse {
            bytes: response_bytes,
            protocol_used: "QUIC",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "QUIC"
    }

    async fn close(&self) {
        self.pool.close().await;
        if let Some(endpoint) = self.endpoint.get() {
            endpoint.close(DOQ_NO_ERROR.into(), b"");
        }
    }
}
