use futures::stream::{FuturesUnordered, StreamExt};
use hickory_proto::op::{Message, ResponseCode};
use meta_dns_application::dns::{msg_to_domain, msg_to_log_string, rcode_to_string};
use meta_dns_application::ports::DnsClient;
use meta_dns_domain::DomainError;
use std::sync::Arc;
use tracing::debug;

use super::client::DEFAULT_DNS_TIMEOUT;

#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub message: Message,
    /// False when the answer came from a short-circuit client.
    pub cache: bool,
}

/// Sends `msg` to every client and keeps the first usable answer.
///
/// A short-circuit client in the set is asked alone. Racing answers with
/// SERVFAIL or REFUSED count as failures so a broken fast server cannot win.
pub async fn batch_exchange(
    clients: &[Arc<dyn DnsClient>],
    msg: &Message,
) -> Result<BatchResponse, DomainError> {
    if let Some(client) = clients.iter().find(|c| c.is_short_circuit()) {
        let message = client.exchange(msg).await?;
        return Ok(BatchResponse {
            message,
            cache: false,
        });
    }

    if clients.is_empty() {
        return Err(DomainError::AllRequestsFailed { first_error: None });
    }

    let domain = msg_to_domain(msg);
    let mut racers = FuturesUnordered::new();
    let mut abort_handles = Vec::with_capacity(clients.len());

    for client in clients {
        let client = client.clone();
        let msg = msg.clone();
        let domain = domain.clone();
        let handle = tokio::spawn(async move {
            let address = client.address();
            let response = client.exchange(&msg).await.map_err(|e| {
                debug!(server = %address, domain = %domain, error = %e, "Upstream exchange failed");
                e
            })?;

            match response.response_code() {
                rcode @ (ResponseCode::ServFail | ResponseCode::Refused) => {
                    debug!(server = %address, domain = %domain, rcode = %rcode_to_string(rcode), "Upstream rejected query");
                    Err(DomainError::ServerFailure(rcode_to_string(rcode)))
                }
                _ => {
                    debug!(
                        server = %address,
                        domain = %domain,
                        answer = %msg_to_log_string(&response),
                        "Upstream answered"
                    );
                    Ok(response)
                }
            }
        });
        abort_handles.push(handle.abort_handle());
        racers.push(handle);
    }

    let race = async {
        let mut first_error: Option<DomainError> = None;
        while let Some(joined) = racers.next().await {
            match joined {
                Ok(Ok(message)) => return Ok(message),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(join_error) => {
                    first_error.get_or_insert(DomainError::IoError(join_error.to_string()));
                }
            }
        }
        Err(DomainError::AllRequestsFailed {
            first_error: first_error.map(Box::new),
        })
    };

    let result = tokio::time::timeout(DEFAULT_DNS_TIMEOUT, race)
        .await
        .unwrap_or_else(|_| {
            Err(DomainError::AllRequestsFailed {
                first_error: Some(Box::new(DomainError::DeadlineExceeded)),
            })
        });

    for handle in abort_handles {
        handle.abort();
    }

    if let Err(e) = &result {
        debug!(domain = %domain, error = %e, "Batch exchange failed");
    }

    result.map(|message| BatchResponse {
        message,
        cache: true,
    })
}
