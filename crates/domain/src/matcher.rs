use crate::trie::{normalize_domain, DomainTrie};
use fancy_regex::Regex;
use ipnetwork::IpNetwork;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

pub trait DomainMatcher: Send + Sync + fmt::Debug {
    fn match_domain(&self, domain: &str) -> bool;
}

pub trait IpMatcher: Send + Sync + fmt::Debug {
    fn match_ip(&self, ip: IpAddr) -> bool;
}

/// Trie-backed set of domain patterns (`+.`, `*.`, `.` prefixes allowed).
#[derive(Debug, Default)]
pub struct DomainSetMatcher {
    trie: DomainTrie<()>,
}

impl DomainSetMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = DomainTrie::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !trie.insert(pattern, ()) {
                return Err(format!("invalid domain pattern '{}'", pattern));
            }
        }
        Ok(Self { trie })
    }
}

impl DomainMatcher for DomainSetMatcher {
    fn match_domain(&self, domain: &str) -> bool {
        self.trie.search(domain).is_some()
    }
}

#[derive(Debug)]
pub struct DomainKeywordMatcher {
    keyword: String,
}

impl DomainKeywordMatcher {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_ascii_lowercase(),
        }
    }
}

impl DomainMatcher for DomainKeywordMatcher {
    fn match_domain(&self, domain: &str) -> bool {
        normalize_domain(domain).contains(&self.keyword)
    }
}

#[derive(Debug)]
pub struct DomainRegexMatcher {
    regex: Regex,
}

impl DomainRegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, String> {
        let regex =
            Regex::new(pattern).map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
        Ok(Self { regex })
    }
}

impl DomainMatcher for DomainRegexMatcher {
    fn match_domain(&self, domain: &str) -> bool {
        self.regex
            .is_match(&normalize_domain(domain))
            .unwrap_or(false)
    }
}

/// Parses rule keys that need a dedicated matcher (`regex:`, `keyword:`, `suffix:`).
///
/// Returns `Ok(None)` for plain domain patterns, which belong in a shared trie.
pub fn parse_domain_matcher(rule: &str) -> Result<Option<Arc<dyn DomainMatcher>>, String> {
    if let Some(pattern) = rule.strip_prefix("regex:") {
        return Ok(Some(Arc::new(DomainRegexMatcher::new(pattern)?)));
    }
    if let Some(keyword) = rule.strip_prefix("keyword:") {
        return Ok(Some(Arc::new(DomainKeywordMatcher::new(keyword))));
    }
    if let Some(suffix) = rule.strip_prefix("suffix:") {
        let matcher = DomainSetMatcher::new([format!("+.{}", suffix.trim_start_matches('.'))])?;
        return Ok(Some(Arc::new(matcher)));
    }
    Ok(None)
}

#[derive(Debug, Default)]
pub struct IpCidrMatcher {
    networks: Vec<IpNetwork>,
}

impl IpCidrMatcher {
    pub fn new<I, S>(cidrs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|cidr| {
                let cidr = cidr.as_ref();
                cidr.parse::<IpNetwork>()
                    .map_err(|e| format!("invalid CIDR '{}': {}", cidr, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }
}

impl IpMatcher for IpCidrMatcher {
    fn match_ip(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }
}
