use meta_dns_domain::HostValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatch {
    pub value: HostValue,
    /// The final value has the kind the caller asked for (alias for domain queries,
    /// addresses otherwise).
    pub kind_matched: bool,
}

pub trait HostTable: Send + Sync {
    fn search(&self, domain: &str, is_domain_query: bool) -> Option<HostMatch>;
}
