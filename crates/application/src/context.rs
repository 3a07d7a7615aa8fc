use meta_dns_domain::DomainError;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Which layer produced the answer. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DnsMsgType {
    Unset = 0,
    Host = 1,
    FakeIp = 2,
    Raw = 3,
}

impl DnsMsgType {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DnsMsgType::Host,
            2 => DnsMsgType::FakeIp,
            3 => DnsMsgType::Raw,
            _ => DnsMsgType::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DnsMsgType::Unset => "",
            DnsMsgType::Host => "host",
            DnsMsgType::FakeIp => "fakeip",
            DnsMsgType::Raw => "raw",
        }
    }
}

/// Per-request state: cancellation, optional deadline and the answer classification tag.
#[derive(Debug)]
pub struct DnsContext {
    id: u64,
    msg_type: AtomicU8,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for DnsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            msg_type: AtomicU8::new(DnsMsgType::Unset as u8),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// New context for a sub-request: same deadline, cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            msg_type: AtomicU8::new(DnsMsgType::Unset as u8),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_type(&self, msg_type: DnsMsgType) {
        self.msg_type.store(msg_type as u8, Ordering::Relaxed);
    }

    pub fn msg_type(&self) -> DnsMsgType {
        DnsMsgType::from_u8(self.msg_type.load(Ordering::Relaxed))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the context error if the caller already gave up.
    pub fn check(&self) -> Result<(), DomainError> {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DomainError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> DomainError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => DomainError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DomainError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                DomainError::Cancelled
            }
        }
    }
}
