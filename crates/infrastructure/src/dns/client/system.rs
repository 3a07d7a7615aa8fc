use crate::dns::batch::batch_exchange;
use crate::dns::transport::{Dialer, ServerAddr};
use async_trait::async_trait;
use hickory_proto::op::Message;
use meta_dns_application::ports::DnsClient;
use meta_dns_domain::name_server::split_host_port;
use meta_dns_domain::DomainError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::wire::WireClient;

pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Servers read from resolv.conf are trusted for this long.
pub const SYSTEM_DNS_REFRESH: Duration = Duration::from_secs(5 * 60);

struct SystemServers {
    servers: Vec<String>,
    clients: Vec<Arc<dyn DnsClient>>,
    refreshed_at: Option<Instant>,
}

/// `system://`: whatever nameservers the host is configured with.
pub struct SystemClient {
    resolv_conf: PathBuf,
    dialer: Dialer,
    state: Mutex<SystemServers>,
}

impl SystemClient {
    pub fn new(dialer: Dialer) -> Self {
        Self::with_resolv_conf(RESOLV_CONF, dialer)
    }

    pub fn with_resolv_conf(path: impl Into<PathBuf>, dialer: Dialer) -> Self {
        Self {
            resolv_conf: path.into(),
            dialer,
            state: Mutex::new(SystemServers {
                servers: Vec::new(),
                clients: Vec::new(),
                refreshed_at: None,
            }),
        }
    }

    async fn clients(&self) -> Result<Vec<Arc<dyn DnsClient>>, DomainError> {
        let mut state = self.state.lock().await;

        let fresh = state
            .refreshed_at
            .is_some_and(|at| at.elapsed() < SYSTEM_DNS_REFRESH);
        if !fresh {
            match tokio::fs::read_to_string(&self.resolv_conf).await {
                Ok(contents) => {
                    let servers = parse_resolv_conf(&contents);
                    if servers != state.servers {
                        debug!(servers = ?servers, "System nameservers changed");
                        state.clients = servers
                            .iter()
                            .filter_map(|s| split_host_port(s, 53))
                            .map(|(host, port)| {
                                Arc::new(WireClient::udp(
                                    ServerAddr::new(host, port),
                                    self.dialer.clone(),
                                )) as Arc<dyn DnsClient>
                            })
                            .collect();
                        state.servers = servers;
                    }
                    state.refreshed_at = Some(Instant::now());
                }
                Err(e) => {
                    warn!(path = %self.resolv_conf.display(), error = %e, "Failed to read resolv.conf");
                }
            }
        }

        if state.clients.is_empty() {
            return Err(DomainError::transport(
                "system://",
                format!("no nameserver found in {}", self.resolv_conf.display()),
            ));
        }
        Ok(state.clients.clone())
    }
}

#[async_trait]
impl DnsClient for SystemClient {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        let clients = self.clients().await?;
        Ok(batch_exchange(&clients, msg).await?.message)
    }

    fn address(&self) -> String {
        "system://".to_string()
    }

    async fn close(&self) {
        let clients = std::mem::take(&mut self.state.lock().await.clients);
        for client in clients {
            client.close().await;
        }
    }
}

/// Extracts `nameserver` entries, skipping comments and scoped link-local addresses.
pub fn parse_resolv_conf(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split(['#', ';']).next().unwrap_or_default().trim())
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("nameserver"), Some(addr)) if !addr.contains('%') => Some(addr.to_string()),
                _ => None,
            }
        })
        .collect()
}
