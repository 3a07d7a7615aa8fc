//! Static hosts table behind [`HostTable`].

mod system;

pub use system::{parse_hosts, SystemHostsReader, SYSTEM_HOSTS};

use meta_dns_application::ports::{HostMatch, HostTable};
use meta_dns_domain::{DomainError, DomainTrie, HostValue};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

/// Alias chains longer than this stop where they are.
pub const MAX_ALIAS_HOPS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct HostsTable {
    trie: DomainTrie<HostValue>,
}

impl HostsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from `[dns.hosts]`, optionally merged over the
    /// operating system hosts file. Configured entries win.
    pub fn from_config(
        hosts: &BTreeMap<String, Vec<String>>,
        system: Option<&SystemHostsReader>,
    ) -> Result<Self, DomainError> {
        let mut table = Self::new();

        for (domain, values) in hosts {
            let value = HostValue::parse(values)
                .map_err(|e| DomainError::ConfigError(format!("hosts '{}': {}", domain, e)))?;
            if !table.insert(domain, value) {
                return Err(DomainError::ConfigError(format!(
                    "invalid hosts domain '{}'",
                    domain
                )));
            }
        }

        if !hosts.contains_key("localhost") {
            table.insert(
                "localhost",
                HostValue::from_ips(vec![
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(Ipv6Addr::LOCALHOST),
                ]),
            );
        }

        if let Some(reader) = system {
            match reader.read() {
                Ok(entries) => {
                    for (domain, ips) in entries {
                        if table.trie.search(&domain).is_none() {
                            table.insert(&domain, HostValue::from_ips(ips));
                        }
                    }
                }
                Err(e) => warn!(error = %e, "System hosts not loaded"),
            }
        }

        Ok(table)
    }

    pub fn insert(&mut self, domain: &str, value: HostValue) -> bool {
        self.trie.insert(domain, value)
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}

impl HostTable for HostsTable {
    /// Address queries follow alias chains inside the table; an alias that
    /// leaves the table comes back unmatched so the caller can resolve it.
    fn search(&self, domain: &str, is_domain_query: bool) -> Option<HostMatch> {
        let mut value = self.trie.search(domain)?;

        if !is_domain_query {
            for _ in 0..MAX_ALIAS_HOPS {
                let Some(next) = value.domain().and_then(|alias| self.trie.search(alias)) else {
                    break;
                };
                value = next;
            }
        }

        Some(HostMatch {
            kind_matched: is_domain_query == value.is_domain(),
            value: value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_address_query_follows_alias_chain() {
        let table = HostsTable::from_config(
            &config(&[
                ("a.example", &["b.example"]),
                ("b.example", &["c.example"]),
                ("c.example", &["10.0.0.1"]),
            ]),
            None,
        )
        .unwrap();

        let found = table.search("a.example", false).unwrap();
        assert!(found.kind_matched);
        assert_eq!(found.value.ips(), &["10.0.0.1".parse::<IpAddr>().unwrap()]);

        let alias = table.search("a.example", true).unwrap();
        assert!(alias.kind_matched);
        assert_eq!(alias.value.domain(), Some("b.example"));
    }

    #[test]
    fn test_alias_outside_table_is_unmatched() {
        let table =
            HostsTable::from_config(&config(&[("short.lan", &["real.example.com"])]), None).unwrap();

        let found = table.search("short.lan", false).unwrap();
        assert!(!found.kind_matched);
        assert_eq!(found.value.domain(), Some("real.example.com"));
    }

    #[test]
    fn test_alias_loop_terminates() {
        let table = HostsTable::from_config(
            &config(&[("x.lan", &["y.lan"]), ("y.lan", &["x.lan"])]),
            None,
        )
        .unwrap();
        assert!(!table.search("x.lan", false).unwrap().kind_matched);
    }

    #[test]
    fn test_wildcards_and_localhost_default() {
        let table =
            HostsTable::from_config(&config(&[("+.dev.lan", &["10.1.1.1"])]), None).unwrap();
        assert!(table.search("api.dev.lan", false).is_some());
        assert!(table.search("dev.lan", false).is_some());
        assert!(table.search("localhost", false).unwrap().kind_matched);
        assert!(table.search("other.lan", false).is_none());
    }

    #[test]
    fn test_configured_entries_win_over_system() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"192.168.1.1 router.lan nas.lan\n").unwrap();
        let reader = SystemHostsReader::with_path(file.path().to_string_lossy());

        let table =
            HostsTable::from_config(&config(&[("router.lan", &["10.0.0.1"])]), Some(&reader))
                .unwrap();

        assert_eq!(
            table.search("router.lan", false).unwrap().value.ips(),
            &["10.0.0.1".parse::<IpAddr>().unwrap()]
        );
        assert!(table.search("nas.lan", false).is_some());
    }

    #[test]
    fn test_invalid_value_rejected() {
        let result = HostsTable::from_config(&config(&[("bad.lan", &["1.1.1.1", "nope"])]), None);
        assert!(result.is_err());
    }
}
