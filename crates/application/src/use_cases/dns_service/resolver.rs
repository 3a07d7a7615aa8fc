use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use meta_dns_domain::DomainError;
use std::sync::Arc;
use tracing::debug;

use super::DnsHandler;
use crate::dns::{empty_answer_response, msg_to_domain, msg_to_qtype, set_reply};
use crate::ports::DnsExchanger;
use crate::{DnsContext, DnsMsgType};

/// Terminal stage: forwards the question to the resolver.
pub struct ResolverHandler {
    exchanger: Arc<dyn DnsExchanger>,
}

impl ResolverHandler {
    pub fn new(exchanger: Arc<dyn DnsExchanger>) -> Self {
        Self { exchanger }
    }
}

#[async_trait]
impl DnsHandler for ResolverHandler {
    async fn handle(&self, ctx: &DnsContext, req: &Message) -> Result<Message, DomainError> {
        ctx.set_type(DnsMsgType::Raw);

        if msg_to_qtype(req) == Some(RecordType::AAAA) && !self.exchanger.ipv6_enabled() {
            return Ok(empty_answer_response(req));
        }

        let mut msg = match self.exchanger.exchange(ctx, req).await {
            Ok(msg) => msg,
            Err(e) => {
                debug!(domain = %msg_to_domain(req), error = %e, "Exchange failed");
                return Err(e);
            }
        };

        set_reply(&mut msg, req);
        msg.set_authoritative(true);
        Ok(msg)
    }
}
