//! Upstream DNS clients and their decorators.

pub mod dhcp;
pub mod disable_types;
pub mod edns0_subnet;
pub mod factory;
pub mod rcode;
pub mod system;
pub mod wire;

use std::time::Duration;

pub use dhcp::DhcpClient;
pub use disable_types::DisableTypeClient;
pub use edns0_subnet::EdnsClientSubnetClient;
pub use factory::{transform, ClientCache, ClientFactory};
pub use rcode::RCodeClient;
pub use system::SystemClient;
pub use wire::WireClient;

/// Budget for one upstream exchange, and for one batch race.
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);
