use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record, RecordType};
use meta_dns_domain::DomainError;
use std::net::IpAddr;
use std::sync::Arc;

use super::DnsHandler;
use crate::dns::{empty_answer_response, query_domain, reply_to, set_msg_ttl};
use crate::ports::FakeIpPool;
use crate::services::FakeIpSkipper;
use crate::{DnsContext, DnsMsgType};

/// Answers A/AAAA with synthetic addresses from the fake-ip pools.
pub struct FakeIpMiddleware {
    skipper: Arc<FakeIpSkipper>,
    pool: Option<Arc<dyn FakeIpPool>>,
    pool6: Option<Arc<dyn FakeIpPool>>,
    ttl: u32,
    next: Arc<dyn DnsHandler>,
}

impl FakeIpMiddleware {
    pub fn new(
        skipper: Arc<FakeIpSkipper>,
        pool: Option<Arc<dyn FakeIpPool>>,
        pool6: Option<Arc<dyn FakeIpPool>>,
        ttl: u32,
        next: Arc<dyn DnsHandler>,
    ) -> Self {
        Self {
            skipper,
            pool,
            pool6,
            ttl,
            next,
        }
    }
}

#[async_trait]
impl DnsHandler for FakeIpMiddleware {
    async fn handle(&self, ctx: &DnsContext, req: &Message) -> Result<Message, DomainError> {
        let Some(query) = req.queries().first() else {
            return self.next.handle(ctx, req).await;
        };

        let host = query_domain(query);
        if self.skipper.should_skip(&host) {
            return self.next.handle(ctx, req).await;
        }

        let rdata = match query.query_type() {
            RecordType::A => match &self.pool {
                Some(pool) => match pool.lookup(&host) {
                    IpAddr::V4(v4) => RData::A(A(v4)),
                    IpAddr::V6(_) => return Ok(empty_answer_response(req)),
                },
                None => return Ok(empty_answer_response(req)),
            },
            RecordType::AAAA => match &self.pool6 {
                Some(pool6) => match pool6.lookup(&host) {
                    IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
                    IpAddr::V4(_) => return Ok(empty_answer_response(req)),
                },
                None => return Ok(empty_answer_response(req)),
            },
            RecordType::SVCB | RecordType::HTTPS => return Ok(empty_answer_response(req)),
            _ => return self.next.handle(ctx, req).await,
        };

        let mut msg = reply_to(req);
        msg.add_answer(Record::from_rdata(query.name().clone(), self.ttl, rdata));
        set_msg_ttl(&mut msg, self.ttl);
        ctx.set_type(DnsMsgType::FakeIp);
        msg.set_response_code(ResponseCode::NoError)
            .set_authoritative(true)
            .set_recursion_available(true);
        Ok(msg)
    }
}
