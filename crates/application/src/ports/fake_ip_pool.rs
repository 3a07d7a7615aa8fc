use ipnetwork::IpNetwork;
use meta_dns_domain::DomainError;
use std::net::IpAddr;

/// Bidirectional host <-> synthetic address table.
pub trait FakeIpPool: Send + Sync {
    /// Returns the address bound to `host`, allocating one if needed.
    fn lookup(&self, host: &str) -> IpAddr;

    fn look_back(&self, ip: IpAddr) -> Option<String>;

    /// Whether `ip` is currently bound to a host.
    fn exist(&self, ip: IpAddr) -> bool;

    fn ip_net(&self) -> IpNetwork;

    fn gateway(&self) -> IpAddr;

    fn broadcast(&self) -> IpAddr;

    fn flush_fake_ip(&self) -> Result<(), DomainError>;

    /// Live bindings, oldest first.
    fn entries(&self) -> Vec<(String, IpAddr)>;

    /// Binds `host` to `ip` if the address is allocatable in this pool.
    fn restore(&self, host: &str, ip: IpAddr) -> bool;

    fn store_state(&self) -> Result<(), DomainError>;

    /// Copies the bindings of `other` that fit in this pool's range.
    fn clone_from_pool(&self, other: &dyn FakeIpPool) {
        for (host, ip) in other.entries() {
            self.restore(&host, ip);
        }
    }
}
