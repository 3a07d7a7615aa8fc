#![allow(dead_code)]

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use meta_dns_application::dns::reply_to;
use meta_dns_application::ports::DnsClient;
use meta_dns_domain::{DomainError, NameServer, NameServerNet};
use meta_dns_infrastructure::dns::{ClientCache, Resolver, ResolverBuilder, ResolverConfig};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(0x2a2a)
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
    msg
}

pub fn answer_ttls(msg: &Message) -> Vec<u32> {
    msg.answers().iter().map(|r| r.ttl()).collect()
}

/// In-process upstream: answers every A/AAAA question with fixed addresses.
pub struct MockClient {
    name: String,
    ips: Vec<IpAddr>,
    ttl: u32,
    rcode: ResponseCode,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockClient {
    pub fn answering(name: &str, ips: &[&str], ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            ips: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
            ttl,
            rcode: ResponseCode::NoError,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str, rcode: ResponseCode) -> Self {
        Self {
            rcode,
            ..Self::answering(name, &[], 0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl DnsClient for MockClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut reply = reply_to(msg);
        reply.set_response_code(self.rcode);
        let Some(question) = msg.queries().first() else {
            return Ok(reply);
        };
        for ip in &self.ips {
            let rdata = match (question.query_type(), ip) {
                (RecordType::A, IpAddr::V4(v4)) => RData::A(A(*v4)),
                (RecordType::AAAA, IpAddr::V6(v6)) => RData::AAAA(AAAA(*v6)),
                _ => continue,
            };
            reply.add_answer(Record::from_rdata(question.name().clone(), self.ttl, rdata));
        }
        Ok(reply)
    }

    fn address(&self) -> String {
        format!("mock://{}", self.name)
    }
}

/// Name server key a mock client is registered under.
pub fn mock_server(name: &str) -> NameServer {
    NameServer::new(NameServerNet::Udp, format!("{}.mock:53", name))
}

/// Resolver whose name servers are served by pre-registered mock clients.
pub struct MockResolverBuilder {
    config: ResolverConfig,
    clients: ClientCache,
}

impl MockResolverBuilder {
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
            clients: ClientCache::new(),
        }
    }

    pub fn main(mut self, name: &str, client: MockClient) -> Self {
        self.config.main.push(self.register(name, client));
        self
    }

    pub fn fallback(mut self, name: &str, client: MockClient) -> Self {
        self.config.fallback.push(self.register(name, client));
        self
    }

    pub fn register(&self, name: &str, client: MockClient) -> NameServer {
        let ns = mock_server(name);
        self.clients.insert(ns.clone(), Arc::new(client));
        ns
    }

    pub fn config(mut self, f: impl FnOnce(&mut ResolverConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Resolver {
        ResolverBuilder::new(self.config)
            .with_clients(self.clients)
            .build()
            .unwrap()
    }
}

impl Default for MockResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Inner client for decorator tests: keeps the last query it saw and answers
/// with fixed records in every section.
pub struct RecordingClient {
    seen: Arc<Mutex<Option<Message>>>,
    calls: Arc<AtomicUsize>,
    answers: Vec<Record>,
    name_servers: Vec<Record>,
    additionals: Vec<Record>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            answers: Vec::new(),
            name_servers: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn with_answer(mut self, record: Record) -> Self {
        self.answers.push(record);
        self
    }

    pub fn with_name_server(mut self, record: Record) -> Self {
        self.name_servers.push(record);
        self
    }

    pub fn with_additional(mut self, record: Record) -> Self {
        self.additionals.push(record);
        self
    }

    pub fn seen(&self) -> Arc<Mutex<Option<Message>>> {
        self.seen.clone()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for RecordingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsClient for RecordingClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = Some(msg.clone());

        let mut reply = reply_to(msg);
        for record in &self.answers {
            reply.add_answer(record.clone());
        }
        for record in &self.name_servers {
            reply.add_name_server(record.clone());
        }
        for record in &self.additionals {
            reply.add_additional(record.clone());
        }
        Ok(reply)
    }

    fn address(&self) -> String {
        "mock://recording".to_string()
    }
}

pub fn a_record(name: &str, ip: [u8; 4]) -> Record {
    Record::from_rdata(Name::from_str(name).unwrap(), 60, RData::A(A::new(ip[0], ip[1], ip[2], ip[3])))
}

pub fn aaaa_record(name: &str, ip: &str) -> Record {
    Record::from_rdata(
        Name::from_str(name).unwrap(),
        60,
        RData::AAAA(AAAA(ip.parse().unwrap())),
    )
}
