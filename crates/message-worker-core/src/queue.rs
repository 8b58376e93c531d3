use serde::{Deserialize, Serialize};

/// Per-queue consumption settings. Immutable once a worker has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,

    /// Deliveries after which a failing message is terminally rejected.
    pub max_retry_attempts: u32,

    /// When false, a rejected message is never rescheduled.
    pub allow_retry: bool,

    /// When false, every retry waits `retry_delay_ms` regardless of attempt.
    pub allow_retry_back_off: bool,

    pub retry_delay_ms: u64,

    pub max_retry_delay_ms: u64,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>) -> Self {
        QueueSpec {
            name: name.into(),
            max_retry_attempts: 3,
            allow_retry: true,
            allow_retry_back_off: false,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 60_000,
        }
    }

    pub fn max_retry_attempts(mut self, max_retry_attempts: u32) -> Self {
        self.max_retry_attempts = max_retry_attempts;
        self
    }

    pub fn allow_retry(mut self, allow_retry: bool) -> Self {
        self.allow_retry = allow_retry;
        self
    }

    pub fn allow_retry_back_off(mut self, allow_retry_back_off: bool) -> Self {
        self.allow_retry_back_off = allow_retry_back_off;
        self
    }

    pub fn retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn max_retry_delay_ms(mut self, max_retry_delay_ms: u64) -> Self {
        self.max_retry_delay_ms = max_retry_delay_ms;
        self
    }

    /// The immutable retry bundle handed to the backoff calculator and the
    /// adapters.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry_attempts: self.max_retry_attempts,
            allow_retry: self.allow_retry,
            allow_retry_back_off: self.allow_retry_back_off,
            retry_delay_ms: self.retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
        }
    }
}

/// Retry configuration snapshot taken from a [`QueueSpec`]. Carries no logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retry_attempts: u32,
    pub allow_retry: bool,
    pub allow_retry_back_off: bool,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}
