use crate::DomainError;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Rcode names accepted by `rcode://`.
pub const RCODE_NAMES: [&str; 6] = [
    "success",
    "format_error",
    "server_failure",
    "name_error",
    "not_implemented",
    "refused",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameServerNet {
    Udp,
    Tcp,
    Tls,
    Https,
    Quic,
    Dhcp,
    System,
    Rcode,
}

impl NameServerNet {
    pub fn scheme(&self) -> &'static str {
        match self {
            NameServerNet::Udp => "udp",
            NameServerNet::Tcp => "tcp",
            NameServerNet::Tls => "tls",
            NameServerNet::Https => "https",
            NameServerNet::Quic => "quic",
            NameServerNet::Dhcp => "dhcp",
            NameServerNet::System => "system",
            NameServerNet::Rcode => "rcode",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            NameServerNet::Tls | NameServerNet::Quic => 853,
            NameServerNet::Https => 443,
            _ => 53,
        }
    }
}

/// One upstream server as configured by the user.
///
/// The proxy is referenced by name; binding the name to an adapter happens when the
/// client is built, so equality here is purely structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameServer {
    pub net: NameServerNet,
    pub addr: String,
    pub interface: Option<String>,
    pub proxy_name: Option<String>,
    pub params: BTreeMap<String, String>,
    pub prefer_h3: bool,
}

impl NameServer {
    pub fn new(net: NameServerNet, addr: impl Into<String>) -> Self {
        Self {
            net,
            addr: addr.into(),
            interface: None,
            proxy_name: None,
            params: BTreeMap::new(),
            prefer_h3: false,
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn param_enabled(&self, key: &str) -> bool {
        self.param(key) == Some("true")
    }

    /// Host and port of stream/datagram servers. `None` for URL-, interface- or rcode-based ones.
    pub fn host_port(&self) -> Option<(String, u16)> {
        match self.net {
            NameServerNet::Udp | NameServerNet::Tcp | NameServerNet::Tls | NameServerNet::Quic => {
                split_host_port(&self.addr, self.net.default_port())
            }
            NameServerNet::Https => {
                let rest = self.addr.strip_prefix("https://")?;
                let authority = rest.split('/').next()?;
                split_host_port(authority, 443)
            }
            _ => None,
        }
    }
}

impl fmt::Display for NameServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.net {
            NameServerNet::Https => write!(f, "{}", self.addr),
            NameServerNet::System => write!(f, "system://"),
            net => write!(f, "{}://{}", net.scheme(), self.addr),
        }
    }
}

/// Turns configured server strings into [`NameServer`] values.
///
/// Passed explicitly to whoever builds resolver configuration.
pub trait NameServerParser: Send + Sync {
    fn parse(&self, servers: &[String]) -> Result<Vec<NameServer>, DomainError>;
}

/// Parses `scheme://host[:port][/path]#proxy&key=value` strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlNameServerParser;

impl NameServerParser for UrlNameServerParser {
    fn parse(&self, servers: &[String]) -> Result<Vec<NameServer>, DomainError> {
        servers.iter().map(|s| parse_name_server(s)).collect()
    }
}

pub fn parse_name_server(raw: &str) -> Result<NameServer, DomainError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DomainError::InvalidNameServer("empty server".to_string()));
    }
    let invalid = |reason: &str| DomainError::InvalidNameServer(format!("{}: {}", raw, reason));

    let with_scheme;
    let raw_url = if raw.contains("://") {
        raw
    } else {
        with_scheme = format!("udp://{}", raw);
        &with_scheme
    };

    let (scheme, rest) = raw_url
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    let (rest, fragment) = match rest.split_once('#') {
        Some((r, f)) => (r, Some(f)),
        None => (rest, None),
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let net = match scheme.to_ascii_lowercase().as_str() {
        "udp" => NameServerNet::Udp,
        "tcp" => NameServerNet::Tcp,
        "tls" | "dot" => NameServerNet::Tls,
        "https" | "doh" => NameServerNet::Https,
        "quic" | "doq" => NameServerNet::Quic,
        "dhcp" if authority.eq_ignore_ascii_case("system") => NameServerNet::System,
        "dhcp" => NameServerNet::Dhcp,
        "system" => NameServerNet::System,
        "rcode" => NameServerNet::Rcode,
        other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
    };

    let addr = match net {
        NameServerNet::Udp | NameServerNet::Tcp | NameServerNet::Tls | NameServerNet::Quic => {
            let (host, port) = split_host_port(authority, net.default_port())
                .ok_or_else(|| invalid("invalid host or port"))?;
            join_host_port(&host, port)
        }
        NameServerNet::Https => {
            let (host, port) =
                split_host_port(authority, 443).ok_or_else(|| invalid("invalid host or port"))?;
            let path = if path.is_empty() { "/dns-query" } else { path };
            format!("https://{}{}", join_host_port(&host, port), path)
        }
        NameServerNet::Dhcp => {
            if authority.is_empty() {
                return Err(invalid("dhcp server needs an interface name"));
            }
            authority.to_string()
        }
        NameServerNet::System => String::new(),
        NameServerNet::Rcode => {
            let code = authority.to_ascii_lowercase();
            if !RCODE_NAMES.contains(&code.as_str()) {
                return Err(invalid(&format!("unknown rcode '{}'", authority)));
            }
            code
        }
    };

    let mut server = NameServer::new(net, addr);
    if let Some(fragment) = fragment {
        for item in fragment.split('&').filter(|s| !s.is_empty()) {
            match item.split_once('=') {
                Some(("h3", value)) => server.prefer_h3 = value == "true",
                Some(("interface", value)) => server.interface = Some(value.to_string()),
                Some((key, value)) => {
                    server.params.insert(key.to_string(), value.to_string());
                }
                None if item == "h3" => server.prefer_h3 = true,
                None => server.proxy_name = Some(item.to_string()),
            }
        }
    }
    if net != NameServerNet::Https {
        server.prefer_h3 = false;
    }

    Ok(server)
}

/// Splits `host[:port]`, `[v6]:port` or a bare IPv6 literal.
pub fn split_host_port(authority: &str, default_port: u16) -> Option<(String, u16)> {
    if authority.is_empty() {
        return None;
    }
    if let Ok(addr) = authority.parse::<SocketAddr>() {
        return Some((addr.ip().to_string(), addr.port()));
    }
    if let Ok(ip) = authority.parse::<IpAddr>() {
        return Some((ip.to_string(), default_port));
    }
    if let Some(inner) = authority.strip_prefix('[') {
        let (host, rest) = inner.split_once(']')?;
        host.parse::<IpAddr>().ok()?;
        let port = match rest.strip_prefix(':') {
            Some(port) => port.parse().ok()?,
            None if rest.is_empty() => default_port,
            None => return None,
        };
        return Some((host.to_string(), port));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host.to_string(), port.parse().ok()?)),
        Some(_) => None,
        None => Some((authority.to_string(), default_port)),
    }
}

pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
