use async_trait::async_trait;
use hickory_proto::op::Message;
use meta_dns_domain::DomainError;

/// What kind of client sits behind a [`DnsClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Talks to a real server (directly or through decorators).
    Upstream,
    /// Answers locally with a fixed response code.
    RCode,
}

impl ClientKind {
    /// Short-circuit clients never race and their answers are never cached.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, ClientKind::RCode)
    }
}

#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError>;

    /// Human-readable identity, used in logs.
    fn address(&self) -> String;

    fn kind(&self) -> ClientKind {
        ClientKind::Upstream
    }

    fn is_short_circuit(&self) -> bool {
        self.kind().is_short_circuit()
    }

    /// Releases pooled connections and background tasks.
    async fn close(&self) {}
}
