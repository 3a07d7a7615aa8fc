use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use meta_dns_application::dns::{empty_answer_response, for_each_section_mut, msg_to_qtype};
use meta_dns_application::ports::{ClientKind, DnsClient};
use meta_dns_domain::{DomainError, NameServer};
use std::collections::HashSet;
use std::sync::Arc;

const DISABLE_QTYPE_PREFIX: &str = "disable-qtype-";

/// Answers queries for disabled record types locally with an empty answer and
/// removes records of those types from upstream responses.
pub struct DisableTypeClient {
    inner: Arc<dyn DnsClient>,
    disabled: HashSet<RecordType>,
}

impl DisableTypeClient {
    pub fn new(inner: Arc<dyn DnsClient>, disabled: HashSet<RecordType>) -> Self {
        Self { inner, disabled }
    }

    fn is_disabled(&self, rtype: RecordType) -> bool {
        self.disabled.contains(&rtype)
    }
}

#[async_trait]
impl DnsClient for DisableTypeClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        if msg_to_qtype(msg).is_some_and(|qtype| self.is_disabled(qtype)) {
            return Ok(empty_answer_response(msg));
        }

        let mut response = self.inner.exchange(msg).await?;
        for_each_section_mut(&mut response, |records| {
            records.retain(|record| !self.is_disabled(record.record_type()));
        });
        Ok(response)
    }

    fn address(&self) -> String {
        self.inner.address()
    }

    fn kind(&self) -> ClientKind {
        self.inner.kind()
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Record types switched off by `disable-ipv4`, `disable-ipv6` and `disable-qtype-<N>`.
pub fn disabled_types(ns: &NameServer) -> HashSet<RecordType> {
    let mut disabled = HashSet::new();
    if ns.param_enabled("disable-ipv4") {
        disabled.insert(RecordType::A);
    }
    if ns.param_enabled("disable-ipv6") {
        disabled.insert(RecordType::AAAA);
    }
    for (key, value) in &ns.params {
        let Some(code) = key.strip_prefix(DISABLE_QTYPE_PREFIX) else {
            continue;
        };
        if value != "true" {
            continue;
        }
        match code.parse::<u16>().map(RecordType::from) {
            Ok(RecordType::Unknown(_)) | Err(_) => {}
            Ok(rtype) => {
                disabled.insert(rtype);
            }
        }
    }
    disabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_dns_domain::NameServerNet;

    #[test]
    fn test_disabled_types_from_params() {
        let ns = NameServer::new(NameServerNet::Udp, "1.1.1.1:53")
            .with_param("disable-ipv6", "true")
            .with_param("disable-qtype-65", "true")
            .with_param("disable-qtype-16", "false")
            .with_param("disable-qtype-65000", "true")
            .with_param("disable-qtype-abc", "true");

        let disabled = disabled_types(&ns);
        assert_eq!(disabled.len(), 2);
        assert!(disabled.contains(&RecordType::AAAA));
        assert!(disabled.contains(&RecordType::HTTPS));
    }

    #[test]
    fn test_nothing_disabled_by_default() {
        assert!(disabled_types(&NameServer::new(NameServerNet::Udp, "1.1.1.1:53")).is_empty());
    }
}
