//! Meta DNS Domain Layer
pub mod config;
pub mod dns_mode;
pub mod errors;
pub mod host_value;
pub mod matcher;
pub mod name_server;
pub mod trie;

pub use config::{CliOverrides, Config, ConfigError, DnsConfig};
pub use dns_mode::DnsMode;
pub use errors::DomainError;
pub use host_value::HostValue;
pub use matcher::{DomainMatcher, IpMatcher};
pub use name_server::{NameServer, NameServerNet, NameServerParser, UrlNameServerParser};
pub use trie::DomainTrie;
