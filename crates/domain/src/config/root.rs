use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::dns::DnsConfig;
use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use crate::{DnsMode, HostValue};

/// Main configuration structure for Meta DNS
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Listener configuration (port, bind address)
    #[serde(default)]
    pub server: ServerConfig,

    /// Resolver, upstream and enhancer configuration
    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. meta-dns.toml in current directory
    /// 3. /etc/meta-dns/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if let Some(path) = Self::get_config_path() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }

        if self.dns.nameserver.is_empty() {
            return Err(ConfigError::Validation(
                "No nameserver configured".to_string(),
            ));
        }

        if self.dns.ipv6 && self.dns.ipv6_timeout == 0 {
            return Err(ConfigError::Validation(
                "ipv6_timeout must be greater than 0 when ipv6 is enabled".to_string(),
            ));
        }

        if self.dns.enhanced_mode == DnsMode::FakeIp {
            let range = self.dns.fake_ip_range.parse::<IpNetwork>().map_err(|e| {
                ConfigError::Validation(format!(
                    "invalid fake_ip_range '{}': {}",
                    self.dns.fake_ip_range, e
                ))
            })?;
            if !range.is_ipv4() {
                return Err(ConfigError::Validation(
                    "fake_ip_range must be an IPv4 network".to_string(),
                ));
            }
            if let Some(range6) = &self.dns.fake_ip_range6 {
                match range6.parse::<IpNetwork>() {
                    Ok(net) if net.is_ipv6() => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "invalid fake_ip_range6 '{}'",
                            range6
                        )))
                    }
                }
            }
        }

        for (domain, values) in &self.dns.hosts {
            HostValue::parse(values).map_err(|e| {
                ConfigError::Validation(format!("hosts entry '{}': {}", domain, e))
            })?;
        }

        for policy in &self.dns.nameserver_policy {
            if policy.servers.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "nameserver_policy '{}' has no servers",
                    policy.domain
                )));
            }
        }

        Ok(())
    }

    /// Get the path to the configuration file being used
    pub fn get_config_path() -> Option<String> {
        if std::path::Path::new("meta-dns.toml").exists() {
            Some("meta-dns.toml".to_string())
        } else if std::path::Path::new("/etc/meta-dns/config.toml").exists() {
            Some("/etc/meta-dns/config.toml".to_string())
        } else {
            None
        }
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}
