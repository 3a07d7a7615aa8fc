mod helpers;

use meta_dns_application::ports::FakeIpPool;
use meta_dns_application::services::{EnhancerConfig, FakeIpSkipper, ResolverEnhancer};
use meta_dns_domain::{DnsMode, DomainError};
use helpers::MockFakeIpPool;
use std::net::IpAddr;
use std::sync::Arc;

fn build(mode: DnsMode, pool: Arc<MockFakeIpPool>, pool6: Arc<MockFakeIpPool>, ttl: u32) -> ResolverEnhancer {
    ResolverEnhancer::new(EnhancerConfig {
        ipv6: true,
        mode,
        fake_pool: Some(pool as Arc<dyn FakeIpPool>),
        fake_pool6: Some(pool6 as Arc<dyn FakeIpPool>),
        skipper: Arc::new(FakeIpSkipper::default()),
        fake_ip_ttl: ttl,
        use_hosts: true,
    })
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_fake_ip_range_excludes_gateway_and_broadcast() {
    let enhancer = build(
        DnsMode::FakeIp,
        Arc::new(MockFakeIpPool::new("198.18.0.0/16")),
        Arc::new(MockFakeIpPool::new("fc00::/18")),
        1,
    );
    assert!(enhancer.is_fake_ip(ip("198.18.3.4")));
    assert!(!enhancer.is_fake_ip(ip("198.18.0.1")));
    assert!(!enhancer.is_fake_ip(ip("198.18.255.255")));
    assert!(enhancer.is_fake_broadcast_ip(ip("198.18.255.255")));
    assert!(!enhancer.is_fake_ip(ip("8.8.8.8")));
    assert!(enhancer.is_fake_ip(ip("fc00::1234")));
}

#[test]
fn test_exist_only_for_allocated_addresses() {
    let pool = Arc::new(MockFakeIpPool::new("198.18.0.0/16"));
    let enhancer = build(
        DnsMode::FakeIp,
        pool.clone(),
        Arc::new(MockFakeIpPool::new("fc00::/18")),
        1,
    );
    let allocated = pool.lookup("example.com");
    assert!(enhancer.is_exist_fake_ip(allocated));
    assert!(!enhancer.is_exist_fake_ip(ip("198.18.9.9")));
    assert_eq!(enhancer.find_host_by_ip(allocated), Some("example.com".to_string()));
}

#[test]
fn test_mapping_mode_disables_fake_checks_but_keeps_mapping() {
    let pool = Arc::new(MockFakeIpPool::new("198.18.0.0/16"));
    let enhancer = build(DnsMode::Mapping, pool.clone(), Arc::new(MockFakeIpPool::new("fc00::/18")), 0);
    let allocated = pool.lookup("example.com");
    assert!(!enhancer.is_fake_ip(allocated));
    assert!(!enhancer.is_exist_fake_ip(allocated));
    assert!(enhancer.mapping_enabled());
    assert_eq!(enhancer.fake_ip_ttl(), 1);

    enhancer.insert_host_by_ip(ip("1.2.3.4"), "mapped.example");
    assert_eq!(enhancer.find_host_by_ip(ip("1.2.3.4")), Some("mapped.example".to_string()));
}

#[test]
fn test_normal_mode_has_no_state() {
    let pool = Arc::new(MockFakeIpPool::new("198.18.0.0/16"));
    let enhancer = build(DnsMode::Normal, pool.clone(), Arc::new(MockFakeIpPool::new("fc00::/18")), 5);
    assert!(enhancer.mapping().is_none());
    assert!(enhancer.fake_pool().is_none());
    let allocated = pool.lookup("example.com");
    assert_eq!(enhancer.find_host_by_ip(allocated), None);
    enhancer.insert_host_by_ip(ip("1.2.3.4"), "ignored");
    assert_eq!(enhancer.find_host_by_ip(ip("1.2.3.4")), None);
    assert!(enhancer.flush_fake_ip().is_ok());
}

#[test]
fn test_pool6_dropped_without_ipv6() {
    let enhancer = ResolverEnhancer::new(EnhancerConfig {
        ipv6: false,
        mode: DnsMode::FakeIp,
        fake_pool: Some(Arc::new(MockFakeIpPool::new("198.18.0.0/16"))),
        fake_pool6: Some(Arc::new(MockFakeIpPool::new("fc00::/18"))),
        skipper: Arc::new(FakeIpSkipper::default()),
        fake_ip_ttl: 1,
        use_hosts: false,
    });
    assert!(enhancer.fake_pool6().is_none());
    assert!(!enhancer.is_fake_ip(ip("fc00::1234")));
}

#[test]
fn test_flush_joins_errors() {
    let enhancer = build(
        DnsMode::FakeIp,
        Arc::new(MockFakeIpPool::new("198.18.0.0/16").failing_flush()),
        Arc::new(MockFakeIpPool::new("fc00::/18").failing_flush()),
        1,
    );
    match enhancer.flush_fake_ip() {
        Err(DomainError::FakeIpPool(msg)) => {
            assert!(msg.contains("198.18.0.0/16"));
            assert!(msg.contains("fc00::/18"));
        }
        other => panic!("expected joined error, got {:?}", other),
    }
}

#[test]
fn test_patch_from_carries_mapping_and_pool_state() {
    let old_pool = Arc::new(MockFakeIpPool::new("198.18.0.0/16"));
    let old = build(DnsMode::FakeIp, old_pool.clone(), Arc::new(MockFakeIpPool::new("fc00::/18")), 1);
    let kept = old_pool.lookup("kept.example");
    old.insert_host_by_ip(ip("5.6.7.8"), "mapped.example");

    let new_pool = Arc::new(MockFakeIpPool::new("198.18.0.0/16"));
    let new = build(DnsMode::FakeIp, new_pool.clone(), Arc::new(MockFakeIpPool::new("fc00::/18")), 1);
    new.patch_from(&old);

    assert_eq!(new.find_host_by_ip(kept), Some("kept.example".to_string()));
    assert_eq!(new.find_host_by_ip(ip("5.6.7.8")), Some("mapped.example".to_string()));
    assert_eq!(new_pool.entries().len(), 1);
}
