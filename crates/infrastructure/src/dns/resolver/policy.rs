use meta_dns_application::ports::DnsClient;
use meta_dns_domain::{DomainMatcher, DomainTrie};
use std::sync::Arc;

pub type ClientSet = Arc<[Arc<dyn DnsClient>]>;

/// One entry of the ordered `nameserver-policy` list.
pub enum Policy {
    /// A run of plain domain rules sharing one trie.
    Domains(DomainTrie<ClientSet>),
    Matcher {
        matcher: Arc<dyn DomainMatcher>,
        clients: ClientSet,
    },
}

impl Policy {
    pub fn matches(&self, domain: &str) -> Option<&ClientSet> {
        let found = match self {
            Policy::Domains(trie) => trie.search(domain),
            Policy::Matcher { matcher, clients } => {
                matcher.match_domain(domain).then_some(clients)
            }
        };
        found.filter(|clients| !clients.is_empty())
    }
}

/// Builds the policy list, keeping declaration order between tries and matchers.
#[derive(Default)]
pub struct PolicyListBuilder {
    policies: Vec<Policy>,
    pending: Option<DomainTrie<ClientSet>>,
}

impl PolicyListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `domain` is not a valid trie pattern.
    pub fn push_domain(&mut self, domain: &str, clients: ClientSet) -> bool {
        self.pending
            .get_or_insert_with(DomainTrie::new)
            .insert(domain, clients)
    }

    pub fn push_matcher(&mut self, matcher: Arc<dyn DomainMatcher>, clients: ClientSet) {
        self.flush();
        self.policies.push(Policy::Matcher { matcher, clients });
    }

    pub fn build(mut self) -> Vec<Policy> {
        self.flush();
        self.policies
    }

    fn flush(&mut self) {
        if let Some(trie) = self.pending.take() {
            self.policies.push(Policy::Domains(trie));
        }
    }
}

/// First policy that yields servers for `domain`.
pub fn match_policy<'a>(policies: &'a [Policy], domain: &str) -> Option<&'a ClientSet> {
    if domain.is_empty() {
        return None;
    }
    policies.iter().find_map(|policy| policy.matches(domain))
}
