pub mod batch;
pub mod cache;
pub mod client;
pub mod fakeip;
pub mod hosts;
pub mod resolver;
pub mod server;
pub mod transport;

pub use batch::{batch_exchange, BatchResponse};
pub use cache::{new_message_cache, put_msg_to_cache, ArcMessageCache, LruMessageCache};
pub use client::{ClientCache, ClientFactory, DEFAULT_DNS_TIMEOUT};
pub use fakeip::{FakeIpStateFile, MemoryFakeIpPool};
pub use hosts::{HostsTable, SystemHostsReader};
pub use resolver::{NameServerPolicy, Resolver, ResolverBuilder, ResolverConfig};
pub use server::DnsServerHandler;
