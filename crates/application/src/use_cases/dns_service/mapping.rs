use async_trait::async_trait;
use hickory_proto::op::Message;
use meta_dns_domain::host_value::unmap;
use meta_dns_domain::DomainError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::DnsHandler;
use crate::cache::ExpiringLruCache;
use crate::dns::{msg_to_domain, record_ip};
use crate::DnsContext;

/// Records `answer ip -> queried host` for every address the rest of the chain returns.
pub struct MappingMiddleware {
    mapping: Arc<ExpiringLruCache<IpAddr, String>>,
    next: Arc<dyn DnsHandler>,
}

impl MappingMiddleware {
    pub fn new(mapping: Arc<ExpiringLruCache<IpAddr, String>>, next: Arc<dyn DnsHandler>) -> Self {
        Self { mapping, next }
    }
}

#[async_trait]
impl DnsHandler for MappingMiddleware {
    async fn handle(&self, ctx: &DnsContext, req: &Message) -> Result<Message, DomainError> {
        let msg = self.next.handle(ctx, req).await?;

        let host = msg_to_domain(req);
        let now = Instant::now();
        for record in msg.answers() {
            let Some(ip) = record_ip(record) else {
                continue;
            };
            let ip = unmap(ip);
            if !is_global_unicast(ip) {
                continue;
            }
            let ttl = record.ttl().max(1);
            self.mapping
                .set_with_expire(ip, host.clone(), now + Duration::from_secs(u64::from(ttl)));
        }

        Ok(msg)
    }
}

fn is_global_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_multicast()
                || v4.is_link_local()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_unspecified() || v6.is_loopback() || v6.is_multicast() || link_local)
        }
    }
}
