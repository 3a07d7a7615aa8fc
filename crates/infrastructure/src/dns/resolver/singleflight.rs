use dashmap::DashMap;
use futures::future::BoxFuture;
use hickory_proto::op::Message;
use meta_dns_domain::DomainError;
use rustc_hash::FxBuildHasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::dns::client::DEFAULT_DNS_TIMEOUT;

/// Failed flights nobody else waited on are re-run in the background while
/// their attempt number is below this.
pub const MAX_FLIGHT_RETRIES: u32 = 3;

/// Upstream work shared by every caller of one key.
pub type FlightWork =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Message, DomainError>> + Send + Sync>;

/// Outcome of one flight, fanned out to every waiter.
#[derive(Debug, Clone)]
pub struct FlightResult {
    pub response: Option<Message>,
    pub error: Option<DomainError>,
    /// Zero for the first run of a key, incremented by each background retry.
    pub attempt: u32,
    /// More than one caller waited on this flight.
    pub shared: bool,
}

impl FlightResult {
    fn new(outcome: Result<Message, DomainError>, attempt: u32, shared: bool) -> Self {
        match outcome {
            Ok(response) => Self {
                response: Some(response),
                error: None,
                attempt,
                shared,
            },
            Err(error) => Self {
                response: None,
                error: Some(error),
                attempt,
                shared,
            },
        }
    }

    pub fn into_result(self) -> Result<Message, DomainError> {
        match (self.response, self.error) {
            (_, Some(error)) => Err(error),
            (Some(response), None) => Ok(response),
            (None, None) => Err(DomainError::AllRequestsFailed { first_error: None }),
        }
    }

    fn should_retry(&self) -> bool {
        self.error.is_some() && !self.shared && self.attempt < MAX_FLIGHT_RETRIES
    }
}

type FlightSender = Arc<watch::Sender<Option<FlightResult>>>;

struct Flight {
    tx: FlightSender,
    waiters: Arc<AtomicUsize>,
}

type FlightTable = DashMap<String, Flight, FxBuildHasher>;

/// Removes the entry if the supervisor dies before publishing.
struct FlightGuard {
    flights: Arc<FlightTable>,
    key: String,
    armed: bool,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flights.remove(&self.key);
        }
    }
}

/// Collapses concurrent identical upstream queries into one.
///
/// Each flight is driven by a supervisor task that outlives any single waiter:
/// a caller giving up never cancels the upstream call, and the supervisor
/// alone decides whether a failed flight is retried.
#[derive(Clone, Default)]
pub struct SingleFlight {
    flights: Arc<FlightTable>,
}

/// A caller's subscription to a flight.
pub struct FlightHandle {
    rx: watch::Receiver<Option<FlightResult>>,
}

impl FlightHandle {
    pub async fn wait(mut self) -> FlightResult {
        match self.rx.wait_for(|result| result.is_some()).await {
            Ok(result) => result.clone().unwrap_or_else(aborted),
            Err(_) => aborted(),
        }
    }
}

fn aborted() -> FlightResult {
    FlightResult::new(
        Err(DomainError::ServerFailure("in-flight query aborted".to_string())),
        MAX_FLIGHT_RETRIES,
        true,
    )
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the flight for `key`, starting one with `work` if none is running.
    pub fn join(&self, key: &str, work: FlightWork) -> FlightHandle {
        Self::launch(self.flights.clone(), key.to_string(), work, 0)
    }

    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    fn launch(flights: Arc<FlightTable>, key: String, work: FlightWork, attempt: u32) -> FlightHandle {
        let (tx, waiters, rx) = match flights.entry(key.clone()) {
            dashmap::Entry::Occupied(e) => {
                // a background retry only rides along; it is not a waiter
                if attempt == 0 {
                    e.get().waiters.fetch_add(1, Ordering::AcqRel);
                }
                let rx = e.get().tx.subscribe();
                return FlightHandle { rx };
            }
            dashmap::Entry::Vacant(e) => {
                let (tx, rx) = watch::channel(None::<FlightResult>);
                let tx = Arc::new(tx);
                let waiters = Arc::new(AtomicUsize::new(if attempt == 0 { 1 } else { 0 }));
                e.insert(Flight {
                    tx: tx.clone(),
                    waiters: waiters.clone(),
                });
                (tx, waiters, rx)
            }
        };

        tokio::spawn(async move {
            let mut guard = FlightGuard {
                flights: flights.clone(),
                key: key.clone(),
                armed: true,
            };

            let outcome = match tokio::time::timeout(DEFAULT_DNS_TIMEOUT, work()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DomainError::DeadlineExceeded),
            };

            flights.remove(&key);
            guard.armed = false;

            let shared = waiters.load(Ordering::Acquire) > 1;
            let result = FlightResult::new(outcome, attempt, shared);
            let retry = result.should_retry();
            tx.send_replace(Some(result));

            if retry {
                debug!(key = %key, attempt = attempt + 1, "Retrying failed query in background");
                Self::launch(flights, key, work, attempt + 1);
            }
        });

        FlightHandle { rx }
    }
}
