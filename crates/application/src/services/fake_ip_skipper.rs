use meta_dns_domain::config::FakeIpFilterMode;
use meta_dns_domain::matcher::{parse_domain_matcher, DomainSetMatcher};
use meta_dns_domain::{DomainError, DomainMatcher};
use std::sync::Arc;

/// Decides which domains bypass fake-ip allocation.
#[derive(Debug, Default)]
pub struct FakeIpSkipper {
    matchers: Vec<Arc<dyn DomainMatcher>>,
    mode: FakeIpFilterMode,
}

impl FakeIpSkipper {
    pub fn new(matchers: Vec<Arc<dyn DomainMatcher>>, mode: FakeIpFilterMode) -> Self {
        Self { matchers, mode }
    }

    /// Builds a skipper from filter rules. Plain patterns share one trie.
    pub fn from_rules(rules: &[String], mode: FakeIpFilterMode) -> Result<Self, DomainError> {
        let mut matchers: Vec<Arc<dyn DomainMatcher>> = Vec::new();
        let mut plain = Vec::new();
        for rule in rules {
            match parse_domain_matcher(rule).map_err(DomainError::ConfigError)? {
                Some(matcher) => matchers.push(matcher),
                None => plain.push(rule.as_str()),
            }
        }
        if !plain.is_empty() {
            let set = DomainSetMatcher::new(plain).map_err(DomainError::ConfigError)?;
            matchers.push(Arc::new(set));
        }
        Ok(Self::new(matchers, mode))
    }

    pub fn should_skip(&self, host: &str) -> bool {
        let matched = self.matchers.iter().any(|m| m.match_domain(host));
        match self.mode {
            FakeIpFilterMode::Blacklist => matched,
            FakeIpFilterMode::Whitelist => !matched,
        }
    }
}
