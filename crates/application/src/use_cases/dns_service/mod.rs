//! Query pipeline: hosts -> fake-ip -> mapping -> resolver, each stage able to answer
//! or delegate to the next one.

mod fake_ip;
mod hosts;
mod mapping;
mod resolver;
mod service;

pub use fake_ip::FakeIpMiddleware;
pub use hosts::{HostsMiddleware, HOSTS_TTL};
pub use mapping::MappingMiddleware;
pub use resolver::ResolverHandler;
pub use service::DnsService;

use async_trait::async_trait;
use hickory_proto::op::Message;
use meta_dns_domain::DomainError;
use std::sync::Arc;

use crate::DnsContext;

#[async_trait]
pub trait DnsHandler: Send + Sync {
    async fn handle(&self, ctx: &DnsContext, req: &Message) -> Result<Message, DomainError>;
}

/// Wraps the next handler into a new one.
pub type Middleware = Box<dyn FnOnce(Arc<dyn DnsHandler>) -> Arc<dyn DnsHandler> + Send>;

/// Chains middlewares so that the first one in the list sees the request first.
pub fn compose(middlewares: Vec<Middleware>, endpoint: Arc<dyn DnsHandler>) -> Arc<dyn DnsHandler> {
    middlewares
        .into_iter()
        .rev()
        .fold(endpoint, |next, middleware| middleware(next))
}
