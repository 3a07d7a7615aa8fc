use async_trait::async_trait;
use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsCode, EdnsOption};
use ipnetwork::IpNetwork;
use meta_dns_application::ports::{ClientKind, DnsClient};
use meta_dns_domain::DomainError;
use std::sync::Arc;

const EDNS_UDP_PAYLOAD: u16 = 4096;

/// Adds an EDNS0 client-subnet option to every outgoing query.
pub struct EdnsClientSubnetClient {
    inner: Arc<dyn DnsClient>,
    subnet: IpNetwork,
    override_existing: bool,
}

impl EdnsClientSubnetClient {
    pub fn new(inner: Arc<dyn DnsClient>, subnet: IpNetwork, override_existing: bool) -> Self {
        Self {
            inner,
            subnet,
            override_existing,
        }
    }
}

#[async_trait]
impl DnsClient for EdnsClientSubnetClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        let mut msg = msg.clone();
        set_edns0_subnet(&mut msg, self.subnet, self.override_existing);
        self.inner.exchange(&msg).await
    }

    fn address(&self) -> String {
        self.inner.address()
    }

    fn kind(&self) -> ClientKind {
        self.inner.kind()
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// `ecs` accepts a prefix (`1.2.3.0/24`) or a bare address, which means a full-length prefix.
pub fn parse_ecs(value: &str) -> Option<IpNetwork> {
    if let Ok(net) = value.parse::<IpNetwork>() {
        return Some(net);
    }
    let ip = value.parse().ok()?;
    let prefix = if matches!(ip, std::net::IpAddr::V4(_)) { 32 } else { 128 };
    IpNetwork::new(ip, prefix).ok()
}

/// Returns false when the message already carries a subnet and `override_existing` is off.
pub fn set_edns0_subnet(msg: &mut Message, subnet: IpNetwork, override_existing: bool) -> bool {
    let has_subnet = msg
        .extensions()
        .as_ref()
        .is_some_and(|edns| edns.options().get(EdnsCode::Subnet).is_some());
    if has_subnet && !override_existing {
        return false;
    }

    let mut edns = msg.extensions().clone().unwrap_or_else(|| {
        let mut edns = Edns::new();
        edns.set_max_payload(EDNS_UDP_PAYLOAD);
        edns
    });
    edns.options_mut().insert(EdnsOption::Subnet(ClientSubnet::new(
        subnet.ip(),
        subnet.prefix(),
        0,
    )));
    msg.set_edns(edns);
    true
}
