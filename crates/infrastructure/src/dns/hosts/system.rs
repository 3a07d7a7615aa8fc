use meta_dns_domain::DomainError;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, warn};

#[cfg(unix)]
pub const SYSTEM_HOSTS: &str = "/etc/hosts";
#[cfg(windows)]
pub const SYSTEM_HOSTS: &str = r"C:\Windows\System32\drivers\etc\hosts";

/// Operating system hosts file reader.
pub struct SystemHostsReader {
    path: String,
}

impl SystemHostsReader {
    pub fn new() -> Self {
        Self {
            path: SYSTEM_HOSTS.to_string(),
        }
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Name -> addresses, in file order.
    pub fn read(&self) -> Result<BTreeMap<String, Vec<IpAddr>>, DomainError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| DomainError::IoError(format!("failed to read {}: {}", self.path, e)))?;
        let entries = parse_hosts(&content);
        debug!(path = %self.path, names = entries.len(), "System hosts loaded");
        Ok(entries)
    }
}

impl Default for SystemHostsReader {
    fn default() -> Self {
        Self::new()
    }
}

// Format of a hosts line:
// 127.0.0.1   localhost loopback   # comment
pub fn parse_hosts(content: &str) -> BTreeMap<String, Vec<IpAddr>> {
    let mut entries: BTreeMap<String, Vec<IpAddr>> = BTreeMap::new();

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let Some(addr) = fields.next() else {
            continue;
        };

        // zone suffixes (fe80::1%lo0) are not representable in IpAddr
        let addr = addr.split('%').next().unwrap_or(addr);
        let ip: IpAddr = match addr.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(entry = %addr, "Skipping invalid hosts address");
                continue;
            }
        };

        for name in fields {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            let ips = entries.entry(name).or_default();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_hosts_lines() {
        let content = "\
# static table
127.0.0.1   localhost loopback
::1         localhost ip6-localhost
10.0.0.5    NAS.lan.   # storage

not-an-ip   broken
fe80::1%lo0 link
";
        let entries = parse_hosts(content);
        assert_eq!(
            entries["localhost"],
            vec!["127.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
        assert_eq!(entries["nas.lan"], vec!["10.0.0.5".parse::<IpAddr>().unwrap()]);
        assert_eq!(entries["link"], vec!["fe80::1".parse::<IpAddr>().unwrap()]);
        assert!(!entries.contains_key("broken"));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "192.168.1.1 router.lan").unwrap();

        let entries = SystemHostsReader::with_path(file.path().to_string_lossy())
            .read()
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(SystemHostsReader::with_path("/nonexistent/hosts").read().is_err());
    }
}
