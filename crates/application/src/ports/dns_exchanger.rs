use async_trait::async_trait;
use hickory_proto::op::Message;
use meta_dns_domain::DomainError;

use crate::DnsContext;

/// Cached, policy-aware message exchange. Implemented by the resolver.
#[async_trait]
pub trait DnsExchanger: Send + Sync {
    async fn exchange(&self, ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError>;

    fn ipv6_enabled(&self) -> bool;
}
