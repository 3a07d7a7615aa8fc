use meta_dns_domain::config::{FakeIpFilterMode, FallbackFilterConfig};
use meta_dns_domain::{Config, DnsConfig, DnsMode, NameServerNet, NameServerParser, UrlNameServerParser};

#[test]
fn test_config_default_values() {
    let config = DnsConfig::default();

    assert!(!config.ipv6);
    assert_eq!(config.ipv6_timeout, 100);
    assert_eq!(config.enhanced_mode, DnsMode::Normal);
    assert!(config.use_hosts);
    assert!(!config.use_system_hosts);
    assert_eq!(config.nameserver, vec!["8.8.8.8", "1.1.1.1"]);
    assert_eq!(config.default_nameserver, vec!["223.5.5.5", "119.29.29.29"]);
    assert!(config.fallback.is_empty());
    assert_eq!(config.fallback_filter, FallbackFilterConfig::default());
    assert_eq!(config.fake_ip_range, "198.18.0.1/16");
    assert_eq!(config.fake_ip_filter_mode, FakeIpFilterMode::Blacklist);
    assert!(config.store_fake_ip.is_none());
}

#[test]
fn test_empty_dns_section_uses_defaults() {
    let config = Config::from_toml("[dns]\n").unwrap();
    assert_eq!(config.dns, DnsConfig::default());
    assert_eq!(config.server.dns_port, 53);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_redir_host_mode_parses() {
    let config = Config::from_toml("[dns]\nenhanced_mode = \"redir-host\"\n").unwrap();
    assert_eq!(config.dns.enhanced_mode, DnsMode::Mapping);
}

#[test]
fn test_unknown_mode_is_parse_error() {
    assert!(Config::from_toml("[dns]\nenhanced_mode = \"magic\"\n").is_err());
}

#[test]
fn test_configured_servers_parse_as_urls() {
    let config = Config::from_toml(
        r#"
        [dns]
        nameserver = ["114.114.114.114", "tls://dns.alidns.com", "https://doh.pub/dns-query"]
        "#,
    )
    .unwrap();

    let servers = UrlNameServerParser.parse(&config.dns.nameserver).unwrap();
    let nets: Vec<_> = servers.iter().map(|ns| ns.net).collect();
    assert_eq!(
        nets,
        vec![NameServerNet::Udp, NameServerNet::Tls, NameServerNet::Https]
    );
}
