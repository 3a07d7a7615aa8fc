mod dns_cache_port;
mod dns_client;
mod dns_exchanger;
mod fake_ip_pool;
mod host_table;
mod proxy_adapter;

pub use dns_cache_port::DnsCachePort;
pub use dns_client::{ClientKind, DnsClient};
pub use dns_exchanger::DnsExchanger;
pub use fake_ip_pool::FakeIpPool;
pub use host_table::{HostMatch, HostTable};
pub use proxy_adapter::{ProxyAdapter, ProxyProvider, ProxyStream};
