use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How answers are rewritten before they reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DnsMode {
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "fake-ip")]
    FakeIp,
    #[serde(rename = "redir-host", alias = "mapping")]
    Mapping,
}

impl fmt::Display for DnsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DnsMode::Normal => "normal",
            DnsMode::FakeIp => "fake-ip",
            DnsMode::Mapping => "redir-host",
        };
        f.write_str(name)
    }
}

impl FromStr for DnsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(DnsMode::Normal),
            "fake-ip" | "fakeip" => Ok(DnsMode::FakeIp),
            "redir-host" | "mapping" => Ok(DnsMode::Mapping),
            other => Err(format!("unknown enhanced mode '{}'", other)),
        }
    }
}
