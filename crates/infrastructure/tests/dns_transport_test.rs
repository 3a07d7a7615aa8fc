use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use meta_dns_application::dns::msg_to_ip;
use meta_dns_application::ports::DnsClient;
use meta_dns_domain::{NameServerParser, UrlNameServerParser};
use meta_dns_infrastructure::dns::client::{ClientFactory, WireClient};
use meta_dns_infrastructure::dns::transport::tcp::TcpTransport;
use meta_dns_infrastructure::dns::transport::udp::UdpTransport;
use meta_dns_infrastructure::dns::transport::{Dialer, DnsTransport, ServerAddr};
use std::net::IpAddr;
use std::time::Duration;

mod helpers;
use helpers::{query, MockDnsServer, MockScript};

fn example_ip() -> IpAddr {
    "93.184.216.34".parse().unwrap()
}

#[tokio::test]
async fn test_udp_transport_round_trip() {
    let server = MockDnsServer::start(MockScript::answer([93, 184, 216, 34], 60))
        .await
        .unwrap();
    let transport = UdpTransport::new(ServerAddr::from(server.addr()), Dialer::default());

    let msg = query("example.com.", RecordType::A);
    let response = transport
        .send(&msg.to_vec().unwrap(), Duration::from_secs(2))
        .await
        .unwrap();

    let decoded = Message::from_vec(&response.bytes).unwrap();
    assert_eq!(decoded.id(), msg.id());
    assert_eq!(msg_to_ip(&decoded), vec![example_ip()]);
    assert_eq!(server.udp_queries(), 1);
}

#[tokio::test]
async fn test_tcp_transport_round_trip() {
    let server = MockDnsServer::start(MockScript::answer([93, 184, 216, 34], 60))
        .await
        .unwrap();
    let transport = TcpTransport::new(ServerAddr::from(server.addr()), Dialer::default());

    let msg = query("example.com.", RecordType::A);
    let response = transport
        .send(&msg.to_vec().unwrap(), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(msg_to_ip(&Message::from_vec(&response.bytes).unwrap()), vec![example_ip()]);
    assert_eq!(server.tcp_queries(), 1);
    assert_eq!(server.udp_queries(), 0);
}

#[tokio::test]
async fn test_truncated_udp_answer_retried_once_over_tcp() {
    let server = MockDnsServer::start(MockScript::answer([93, 184, 216, 34], 60).truncating())
        .await
        .unwrap();
    let client = WireClient::udp(ServerAddr::from(server.addr()), Dialer::default());

    let msg = query("big.example.", RecordType::A);
    let response = client.exchange(&msg).await.unwrap();

    assert!(!response.truncated());
    assert_eq!(response.id(), msg.id());
    assert_eq!(msg_to_ip(&response), vec![example_ip()]);
    assert_eq!(server.udp_queries(), 1);
    assert_eq!(server.tcp_queries(), 1);
}

#[tokio::test]
async fn test_unanswered_udp_query_times_out() {
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client = WireClient::udp(
        ServerAddr::from(silent.local_addr().unwrap()),
        Dialer::default(),
    )
    .with_timeout(Duration::from_millis(200));

    let result = client.exchange(&query("example.com.", RecordType::A)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_factory_builds_clients_from_urls() {
    let server = MockDnsServer::start(MockScript::answer([93, 184, 216, 34], 60))
        .await
        .unwrap();
    let servers = UrlNameServerParser
        .parse(&[
            server.addr().to_string(),
            format!("tcp://{}", server.addr()),
        ])
        .unwrap();
    let factory = ClientFactory::default();

    for ns in &servers {
        let client = factory.create(ns).unwrap();
        let response = client.exchange(&query("example.com.", RecordType::A)).await.unwrap();
        assert_eq!(msg_to_ip(&response), vec![example_ip()]);
        client.close().await;
    }

    assert_eq!(server.udp_queries(), 1);
    assert_eq!(server.tcp_queries(), 1);
}
