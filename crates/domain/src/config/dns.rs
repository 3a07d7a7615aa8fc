use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::DnsMode;

/// Servers used for domains matched by `domain`, evaluated in declaration order.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NameServerPolicyConfig {
    pub domain: String,

    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FallbackFilterConfig {
    /// Answers containing an address inside one of these networks are re-queried on fallback.
    #[serde(default)]
    pub ipcidr: Vec<String>,

    /// Domains that skip the main servers and only use fallback.
    #[serde(default)]
    pub domain: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FakeIpFilterMode {
    /// Listed domains are answered with real addresses.
    #[default]
    Blacklist,
    /// Only listed domains receive fake addresses.
    Whitelist,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheAlgorithm {
    #[default]
    Lru,
    Arc,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DnsConfig {
    #[serde(default = "default_false")]
    pub ipv6: bool,

    /// Milliseconds to wait for AAAA answers after A answers arrive.
    #[serde(default = "default_ipv6_timeout")]
    pub ipv6_timeout: u64,

    #[serde(default)]
    pub enhanced_mode: DnsMode,

    #[serde(default)]
    pub cache_algorithm: CacheAlgorithm,

    #[serde(default = "default_true")]
    pub use_hosts: bool,

    #[serde(default = "default_false")]
    pub use_system_hosts: bool,

    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,

    /// Plain servers used to resolve the host names of other servers.
    #[serde(default)]
    pub default_nameserver: Vec<String>,

    #[serde(default)]
    pub nameserver: Vec<String>,

    #[serde(default)]
    pub fallback: Vec<String>,

    #[serde(default)]
    pub proxy_server_nameserver: Vec<String>,

    #[serde(default)]
    pub nameserver_policy: Vec<NameServerPolicyConfig>,

    #[serde(default)]
    pub fallback_filter: FallbackFilterConfig,

    #[serde(default = "default_fake_ip_range")]
    pub fake_ip_range: String,

    #[serde(default)]
    pub fake_ip_range6: Option<String>,

    #[serde(default)]
    pub fake_ip_filter: Vec<String>,

    #[serde(default)]
    pub fake_ip_filter_mode: FakeIpFilterMode,

    #[serde(default = "default_fake_ip_ttl")]
    pub fake_ip_ttl: u32,

    /// File the fake-ip allocation table is persisted to on shutdown.
    #[serde(default)]
    pub store_fake_ip: Option<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            ipv6: false,
            ipv6_timeout: default_ipv6_timeout(),
            enhanced_mode: DnsMode::Normal,
            cache_algorithm: CacheAlgorithm::Lru,
            use_hosts: true,
            use_system_hosts: false,
            hosts: BTreeMap::new(),
            default_nameserver: vec!["223.5.5.5".to_string(), "119.29.29.29".to_string()],
            nameserver: vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()],
            fallback: vec![],
            proxy_server_nameserver: vec![],
            nameserver_policy: vec![],
            fallback_filter: FallbackFilterConfig::default(),
            fake_ip_range: default_fake_ip_range(),
            fake_ip_range6: None,
            fake_ip_filter: vec![],
            fake_ip_filter_mode: FakeIpFilterMode::Blacklist,
            fake_ip_ttl: default_fake_ip_ttl(),
            store_fake_ip: None,
        }
    }
}

fn default_ipv6_timeout() -> u64 {
    100
}

fn default_fake_ip_range() -> String {
    "198.18.0.1/16".to_string()
}

fn default_fake_ip_ttl() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}
