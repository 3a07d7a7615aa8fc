use hickory_proto::op::Message;
use meta_dns_domain::{DnsMode, DomainError};
use std::sync::Arc;

use super::{
    compose, DnsHandler, FakeIpMiddleware, HostsMiddleware, MappingMiddleware, Middleware,
    ResolverHandler,
};
use crate::ports::{DnsExchanger, HostTable};
use crate::services::ResolverEnhancer;
use crate::DnsContext;

/// Entry point for inbound queries.
pub struct DnsService {
    handler: Arc<dyn DnsHandler>,
}

impl DnsService {
    /// Assembles the chain for the enhancer's mode. Hosts are consulted only when both
    /// enabled and provided.
    pub fn new(
        exchanger: Arc<dyn DnsExchanger>,
        enhancer: &ResolverEnhancer,
        hosts: Option<Arc<dyn HostTable>>,
    ) -> Self {
        let mut middlewares: Vec<Middleware> = Vec::new();

        if enhancer.use_hosts() {
            if let Some(hosts) = hosts {
                let mapping = enhancer.mapping();
                middlewares.push(Box::new(move |next: Arc<dyn DnsHandler>| {
                    Arc::new(HostsMiddleware::new(hosts, mapping, next)) as Arc<dyn DnsHandler>
                }));
            }
        }

        if enhancer.mode() == DnsMode::FakeIp {
            let skipper = enhancer.skipper();
            let pool = enhancer.fake_pool();
            let pool6 = enhancer.fake_pool6();
            let ttl = enhancer.fake_ip_ttl();
            middlewares.push(Box::new(move |next: Arc<dyn DnsHandler>| {
                Arc::new(FakeIpMiddleware::new(skipper, pool, pool6, ttl, next))
                    as Arc<dyn DnsHandler>
            }));
        }

        if enhancer.mode() != DnsMode::Normal {
            if let Some(mapping) = enhancer.mapping() {
                middlewares.push(Box::new(move |next: Arc<dyn DnsHandler>| {
                    Arc::new(MappingMiddleware::new(mapping, next)) as Arc<dyn DnsHandler>
                }));
            }
        }

        let endpoint: Arc<dyn DnsHandler> = Arc::new(ResolverHandler::new(exchanger));
        Self {
            handler: compose(middlewares, endpoint),
        }
    }

    pub fn from_handler(handler: Arc<dyn DnsHandler>) -> Self {
        Self { handler }
    }

    pub async fn serve_msg(&self, ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError> {
        if msg.queries().is_empty() {
            return Err(DomainError::NoQuestion);
        }
        self.handler.handle(ctx, msg).await
    }
}
