use std::net::IpAddr;

/// Value of a static hosts entry: either literal addresses or an alias to another domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostValue {
    Ips(Vec<IpAddr>),
    Domain(String),
}

impl HostValue {
    pub fn from_ips(ips: Vec<IpAddr>) -> Self {
        HostValue::Ips(ips.into_iter().map(unmap).collect())
    }

    pub fn from_domain(domain: &str) -> Self {
        HostValue::Domain(domain.trim_end_matches('.').to_ascii_lowercase())
    }

    /// Parses a config value: a list of addresses, or a single non-address entry as an alias.
    pub fn parse(values: &[String]) -> Result<Self, String> {
        if values.is_empty() {
            return Err("empty hosts value".to_string());
        }

        let mut ips = Vec::with_capacity(values.len());
        for value in values {
            match value.parse::<IpAddr>() {
                Ok(ip) => ips.push(ip),
                Err(_) if values.len() == 1 => return Ok(HostValue::from_domain(value)),
                Err(_) => return Err(format!("invalid hosts address '{}'", value)),
            }
        }
        Ok(HostValue::from_ips(ips))
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, HostValue::Domain(_))
    }

    pub fn ips(&self) -> &[IpAddr] {
        match self {
            HostValue::Ips(ips) => ips,
            HostValue::Domain(_) => &[],
        }
    }

    pub fn domain(&self) -> Option<&str> {
        match self {
            HostValue::Domain(domain) => Some(domain),
            HostValue::Ips(_) => None,
        }
    }
}

pub fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
