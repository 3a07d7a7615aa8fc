use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("should have one question at least")]
    NoQuestion,

    #[error("IP version error")]
    IpVersionMismatch,

    #[error("couldn't find ip")]
    IpNotFound,

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("server failure: {0}")]
    ServerFailure(String),

    #[error("all DNS requests failed{}", first_error_suffix(.first_error))]
    AllRequestsFailed { first_error: Option<Box<DomainError>> },

    #[error("Transport timeout connecting to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport connection reset by {server}")]
    TransportConnectionReset { server: String },

    #[error("Transport error from {server}: {reason}")]
    Transport { server: String, reason: String },

    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Invalid name server: {0}")]
    InvalidNameServer(String),

    #[error("Fake IP pool error: {0}")]
    FakeIpPool(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn first_error_suffix(first_error: &Option<Box<DomainError>>) -> String {
    match first_error {
        Some(err) => format!(", first error: {}", err),
        None => String::new(),
    }
}

impl DomainError {
    pub fn transport(server: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DomainError::Transport {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    /// Cancellation and deadline errors come from the caller, not from an upstream.
    pub fn is_context_error(&self) -> bool {
        matches!(self, DomainError::Cancelled | DomainError::DeadlineExceeded)
    }
}
