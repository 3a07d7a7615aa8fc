use super::dialer::{Dialer, ServerAddr};
use super::{map_io_error, timeout_error, DnsTransport, TransportResponse};
use async_trait::async_trait;
use meta_dns_domain::DomainError;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

/// DNS over TCP. Every query gets a fresh connection, which is also what the
/// truncation retry relies on.
pub struct TcpTransport {
    server: ServerAddr,
    dialer: Dialer,
}

impl TcpTransport {
    pub fn new(server: ServerAddr, dialer: Dialer) -> Self {
        Self { server, dialer }
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let deadline = Instant::now() + timeout;
        let server = self.server.to_string();

        let mut stream = self.dialer.dial_tcp(&self.server, timeout).await?;

        tokio::time::timeout_at(deadline, send_with_length_prefix(&mut stream, message_bytes))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))?;

        debug!(server = %server, message_len = message_bytes.len(), "TCP query sent");

        let response_bytes = tokio::time::timeout_at(deadline, read_with_length_prefix(&mut stream))
            .await
            .map_err(|_| timeout_error(&server))?
            .map_err(|e| map_io_error(&server, e))?;

        debug!(server = %server, response_len = response_bytes.len(), "TCP response received");

        let _ = stream.shutdown().await;

        Ok(TransportResponse {
            bytes: response_bytes,
            protocol_used: "TCP",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }
}

pub(crate) async fn send_with_length_prefix<S>(stream: &mut S, message_bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWriteExt + Unpin + ?Sized,
{
    if message_bytes.len() > MAX_TCP_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {} bytes", message_bytes.len()),
        ));
    }

    let mut frame = Vec::with_capacity(message_bytes.len() + 2);
    frame.extend_from_slice(&(message_bytes.len() as u16).to_be_bytes());
    frame.extend_from_slice(message_bytes);

    stream.write_all(&frame).await?;
    stream.flush().await
}

pub(crate) async fn read_with_length_prefix<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncReadExt + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;

    let response_len = u16::from_be_bytes(len_buf) as usize;
    let mut response = vec![0u8; response_len];
    stream.read_exact(&mut response).await?;

    Ok(response)
}
