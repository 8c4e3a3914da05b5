//! Circuit breaker for backend clients.
//!
//! Wraps calls to a metastore or REST catalog. Only failures classified as
//! [`CatalogError::BackendUnavailable`] count against the backend; a
//! not-found or conflict answer is a healthy response. While open, calls are
//! refused with `BackendUnavailable` without touching the backend.

use crate::error::{CatalogError, CatalogResult};
use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are refused
    Open,
    /// A limited number of trial calls pass through
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive backend failures before opening
    pub failure_threshold: u32,

    /// How long to stay open before allowing a trial call
    pub reset_timeout: Duration,

    /// Trial successes required to close again
    pub success_threshold: u32,

    /// Backend name for logging
    pub name: String,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
            name: name.into(),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

struct Inner {
    state: CircuitState,
    failures: u32,
    trial_successes: u32,
    opened_at: Option<Instant>,
}

/// Per-backend circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        debug!(backend = %config.name, "Circuit breaker created");
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                trial_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let waited = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if waited {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_successes = 0;
                    info!(backend = %self.config.name, "Circuit breaker half-open, allowing trial calls");
                }
                waited
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.trial_successes = 0;
                    inner.opened_at = None;
                    info!(backend = %self.config.name, "Circuit breaker closed (recovered)");
                }
            }
            CircuitState::Closed | CircuitState::Open => inner.failures = 0,
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        let reopen = match inner.state {
            CircuitState::Closed => inner.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if reopen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trial_successes = 0;
            warn!(
                backend = %self.config.name,
                failures = inner.failures,
                "Circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Run `f` under the breaker.
    ///
    /// Refuses with `BackendUnavailable` while open. Only retryable errors
    /// returned by `f` are recorded as failures.
    pub async fn call<F, Fut, T>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        if !self.is_allowed() {
            return Err(CatalogError::unavailable(format!(
                "circuit breaker for '{}' is open",
                self.config.name
            )));
        }
        let result = f().await;
        match &result {
            Err(e) if e.is_retryable() => self.record_failure(),
            _ => self.record_success(),
        }
        result
    }
}
