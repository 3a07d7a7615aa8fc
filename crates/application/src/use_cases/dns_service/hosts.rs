use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use meta_dns_domain::{DomainError, HostValue};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::DnsHandler;
use crate::cache::ExpiringLruCache;
use crate::dns::{is_ip_request, query_domain, reply_to};
use crate::ports::HostTable;
use crate::{DnsContext, DnsMsgType};

/// TTL of every record synthesized from the hosts table.
pub const HOSTS_TTL: u32 = 10;

/// Answers A/AAAA/CNAME questions from the static hosts table.
pub struct HostsMiddleware {
    hosts: Arc<dyn HostTable>,
    mapping: Option<Arc<ExpiringLruCache<IpAddr, String>>>,
    next: Arc<dyn DnsHandler>,
}

impl HostsMiddleware {
    pub fn new(
        hosts: Arc<dyn HostTable>,
        mapping: Option<Arc<ExpiringLruCache<IpAddr, String>>>,
        next: Arc<dyn DnsHandler>,
    ) -> Self {
        Self {
            hosts,
            mapping,
            next,
        }
    }

    /// Resolves `alias` through the rest of the chain and presents the result as an
    /// answer for the original name, prefixed with the CNAME that links them.
    async fn follow_alias(
        &self,
        ctx: &DnsContext,
        req: &Message,
        alias: &str,
    ) -> Result<Message, DomainError> {
        let alias_name = fqdn(alias)?;
        let original_queries = req.queries().to_vec();
        let Some(original) = original_queries.first() else {
            return Err(DomainError::NoQuestion);
        };

        let mut redirected = req.clone();
        let mut query = original.clone();
        query.set_name(alias_name.clone());
        redirected.take_queries();
        redirected.add_query(query);

        let mut resp = self.next.handle(ctx, &redirected).await?;
        resp.set_id(req.id());
        resp.take_queries();
        resp.add_queries(original_queries.iter().cloned());

        let cname = Record::from_rdata(
            original.name().clone(),
            HOSTS_TTL,
            RData::CNAME(CNAME(alias_name)),
        );
        let mut answers = resp.take_answers();
        answers.insert(0, cname);
        resp.insert_answers(answers);
        Ok(resp)
    }

    fn remember(&self, ip: IpAddr, host: &str) {
        if let Some(mapping) = &self.mapping {
            let expires = Instant::now() + Duration::from_secs(u64::from(HOSTS_TTL));
            mapping.set_with_expire(ip, host.to_string(), expires);
        }
    }
}

#[async_trait]
impl DnsHandler for HostsMiddleware {
    async fn handle(&self, ctx: &DnsContext, req: &Message) -> Result<Message, DomainError> {
        let Some(query) = req.queries().first() else {
            return self.next.handle(ctx, req).await;
        };
        if !is_ip_request(query) {
            return self.next.handle(ctx, req).await;
        }

        let host = query_domain(query);
        let qtype = query.query_type();
        let is_domain_query = qtype != RecordType::A && qtype != RecordType::AAAA;

        let Some(found) = self.hosts.search(&host, is_domain_query) else {
            return self.next.handle(ctx, req).await;
        };

        if !found.kind_matched {
            if let HostValue::Domain(alias) = &found.value {
                return self.follow_alias(ctx, req, alias).await;
            }
            return self.next.handle(ctx, req).await;
        }

        let mut msg = reply_to(req);
        match (qtype, &found.value) {
            (RecordType::A, HostValue::Ips(ips)) => {
                for ip in ips {
                    if let IpAddr::V4(v4) = ip {
                        msg.add_answer(Record::from_rdata(
                            query.name().clone(),
                            HOSTS_TTL,
                            RData::A(A(*v4)),
                        ));
                        self.remember(*ip, &host);
                    }
                }
            }
            (RecordType::AAAA, HostValue::Ips(ips)) => {
                for ip in ips {
                    if let IpAddr::V6(v6) = ip {
                        msg.add_answer(Record::from_rdata(
                            query.name().clone(),
                            HOSTS_TTL,
                            RData::AAAA(AAAA(*v6)),
                        ));
                        self.remember(*ip, &host);
                    }
                }
            }
            (RecordType::CNAME, HostValue::Domain(alias)) => {
                msg.add_answer(Record::from_rdata(
                    query.name().clone(),
                    HOSTS_TTL,
                    RData::CNAME(CNAME(fqdn(alias)?)),
                ));
            }
            _ => return self.next.handle(ctx, req).await,
        }

        ctx.set_type(DnsMsgType::Host);
        msg.set_response_code(ResponseCode::NoError)
            .set_authoritative(true)
            .set_recursion_available(true);
        Ok(msg)
    }
}

fn fqdn(domain: &str) -> Result<Name, DomainError> {
    let mut name = Name::from_ascii(domain)
        .map_err(|e| DomainError::InvalidDomainName(format!("{}: {}", domain, e)))?;
    name.set_fqdn(true);
    Ok(name)
}
