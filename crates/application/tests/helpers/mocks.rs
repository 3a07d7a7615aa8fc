#![allow(dead_code)]

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use ipnetwork::IpNetwork;
use meta_dns_application::ports::{DnsExchanger, FakeIpPool, HostMatch, HostTable};
use meta_dns_application::DnsContext;
use meta_dns_domain::{DomainError, HostValue};
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(0x1234)
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
    msg
}

pub fn answer_ttls(msg: &Message) -> Vec<u32> {
    msg.answers().iter().map(|r| r.ttl()).collect()
}

/// Exchanger answering A/AAAA questions from a domain -> addresses table.
#[derive(Clone)]
pub struct MockExchanger {
    answers: Arc<RwLock<HashMap<String, Vec<IpAddr>>>>,
    errors: Arc<RwLock<HashMap<String, DomainError>>>,
    ipv6: bool,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockExchanger {
    pub fn new(ipv6: bool) -> Self {
        Self {
            answers: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            ipv6,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_answer(&self, domain: &str, ips: &[&str]) {
        self.answers.write().unwrap().insert(
            domain.to_string(),
            ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        );
    }

    pub fn set_error(&self, domain: &str, error: DomainError) {
        self.errors
            .write()
            .unwrap()
            .insert(domain.to_string(), error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsExchanger for MockExchanger {
    async fn exchange(&self, _ctx: &DnsContext, msg: &Message) -> Result<Message, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = msg.queries().first().ok_or(DomainError::NoQuestion)?;
        let domain = query.name().to_ascii().trim_end_matches('.').to_string();
        self.seen.lock().unwrap().push(domain.clone());

        if let Some(err) = self.errors.read().unwrap().get(&domain) {
            return Err(err.clone());
        }

        let mut resp = Message::new();
        resp.set_id(0xbeef).set_message_type(MessageType::Response);
        resp.add_query(query.clone());
        let ips = self
            .answers
            .read()
            .unwrap()
            .get(&domain)
            .cloned()
            .unwrap_or_default();
        for ip in ips {
            let rdata = match (query.query_type(), ip) {
                (RecordType::A, IpAddr::V4(v4)) => RData::A(A(v4)),
                (RecordType::AAAA, IpAddr::V6(v6)) => RData::AAAA(AAAA(v6)),
                _ => continue,
            };
            resp.add_answer(Record::from_rdata(query.name().clone(), 120, rdata));
        }
        Ok(resp)
    }

    fn ipv6_enabled(&self) -> bool {
        self.ipv6
    }
}

/// Hosts table with alias chains.
#[derive(Default)]
pub struct MockHostTable {
    entries: HashMap<String, HostValue>,
}

impl MockHostTable {
    pub fn with(mut self, domain: &str, values: &[&str]) -> Self {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.entries
            .insert(domain.to_string(), HostValue::parse(&values).unwrap());
        self
    }
}

impl HostTable for MockHostTable {
    fn search(&self, domain: &str, is_domain_query: bool) -> Option<HostMatch> {
        let mut value = self.entries.get(domain)?.clone();
        while !(is_domain_query && value.is_domain()) {
            match value.domain().and_then(|d| self.entries.get(d)) {
                Some(next) => value = next.clone(),
                None => break,
            }
        }
        let kind_matched = is_domain_query == value.is_domain();
        Some(HostMatch {
            value,
            kind_matched,
        })
    }
}

/// Sequential allocator over a network, without recycling.
pub struct MockFakeIpPool {
    net: IpNetwork,
    next: Mutex<u32>,
    by_host: Mutex<Vec<(String, IpAddr)>>,
    fail_flush: bool,
}

impl MockFakeIpPool {
    pub fn new(cidr: &str) -> Self {
        Self {
            net: cidr.parse().unwrap(),
            next: Mutex::new(2),
            by_host: Mutex::new(Vec::new()),
            fail_flush: false,
        }
    }

    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    fn nth(&self, offset: u32) -> IpAddr {
        match self.net {
            IpNetwork::V4(net) => IpAddr::V4((u32::from(net.network()) + offset).into()),
            IpNetwork::V6(net) => IpAddr::V6((u128::from(net.network()) + offset as u128).into()),
        }
    }
}

impl FakeIpPool for MockFakeIpPool {
    fn lookup(&self, host: &str) -> IpAddr {
        let mut by_host = self.by_host.lock().unwrap();
        if let Some((_, ip)) = by_host.iter().find(|(h, _)| h == host) {
            return *ip;
        }
        let mut next = self.next.lock().unwrap();
        let ip = self.nth(*next);
        *next += 1;
        by_host.push((host.to_string(), ip));
        ip
    }

    fn look_back(&self, ip: IpAddr) -> Option<String> {
        self.by_host
            .lock()
            .unwrap()
            .iter()
            .find(|(_, i)| *i == ip)
            .map(|(h, _)| h.clone())
    }

    fn exist(&self, ip: IpAddr) -> bool {
        self.look_back(ip).is_some()
    }

    fn ip_net(&self) -> IpNetwork {
        self.net
    }

    fn gateway(&self) -> IpAddr {
        self.nth(1)
    }

    fn broadcast(&self) -> IpAddr {
        match self.net {
            IpNetwork::V4(net) => IpAddr::V4(net.broadcast()),
            IpNetwork::V6(net) => {
                IpAddr::V6((u128::from(net.network()) | !u128::from(net.mask())).into())
            }
        }
    }

    fn flush_fake_ip(&self) -> Result<(), DomainError> {
        if self.fail_flush {
            return Err(DomainError::FakeIpPool(format!("flush {} failed", self.net)));
        }
        self.by_host.lock().unwrap().clear();
        Ok(())
    }

    fn entries(&self) -> Vec<(String, IpAddr)> {
        self.by_host.lock().unwrap().clone()
    }

    fn restore(&self, host: &str, ip: IpAddr) -> bool {
        if !self.net.contains(ip) {
            return false;
        }
        self.by_host.lock().unwrap().push((host.to_string(), ip));
        true
    }

    fn store_state(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
