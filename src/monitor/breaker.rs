//! Three-state circuit breaker.
//!
//! - `Closed`: calls pass through
//! - `Open`: calls are rejected with [`BridgeError::ResourceExhausted`] until the
//!   recovery time has elapsed since the last failure
//! - `HalfOpen`: a single trial call is admitted; success closes the breaker,
//!   failure reopens it
//!
//! The wrapped call's own error is always handed back to the caller untouched.

use crate::error::BridgeError;
use crate::models::BridgeConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds for one breaker
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Failures that open the breaker
    pub threshold: u32,
    /// Successful calls slower than this are logged
    pub slow_call: Duration,
    /// Wait after the last failure before a trial call is admitted
    pub recovery_time: Duration,
}

impl BreakerSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            threshold: config.circuit_breaker_threshold,
            slow_call: config.circuit_breaker_timeout,
            recovery_time: config.circuit_breaker_recovery_time,
        }
    }
}

/// Result of a guarded call
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The breaker refused to run the call
    #[error("{0}")]
    Rejected(BridgeError),

    /// The call ran and failed with its own error
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, BreakerError::Rejected(_))
    }

    /// The wrapped call's error, if the call actually ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Rejected(_) => None,
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let name = name.into();
        tracing::debug!(
            breaker = %name,
            threshold = settings.threshold,
            recovery_secs = settings.recovery_time.as_secs_f64(),
            "Circuit breaker created"
        );

        Self {
            name,
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure.map(|t| t.elapsed()),
        }
    }

    /// Run a synchronous call through the breaker
    pub fn call<F, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let guard = self.admit().map_err(BreakerError::Rejected)?;
        let result = f();
        guard.complete(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    /// Run an asynchronous call through the breaker.
    ///
    /// A call whose future is dropped before completion counts as a failure.
    pub async fn call_async<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.admit().map_err(BreakerError::Rejected)?;
        let result = f().await;
        guard.complete(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    fn admit(&self) -> Result<CallGuard<'_>, BridgeError> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .is_none_or(|t| t.elapsed() >= self.settings.recovery_time);
                if !recovered {
                    return Err(self.rejection("OPEN"));
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                tracing::info!(
                    breaker = %self.name,
                    "Circuit breaker half-open, admitting trial call"
                );
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.rejection("HALF_OPEN with a trial call in flight"));
                }
                inner.trial_in_flight = true;
            }
        }

        Ok(CallGuard {
            breaker: self,
            started: Instant::now(),
            done: false,
        })
    }

    fn rejection(&self, state: &str) -> BridgeError {
        tracing::debug!(breaker = %self.name, "Call rejected, breaker is {}", state);
        BridgeError::ResourceExhausted(format!("Circuit breaker '{}' is {}", self.name, state))
    }

    fn record(&self, success: bool, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;

        if success {
            if elapsed > self.settings.slow_call {
                tracing::warn!(
                    breaker = %self.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Guarded call exceeded slow-call threshold"
                );
            }
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                tracing::info!(
                    breaker = %self.name,
                    "Circuit breaker closed after successful trial"
                );
            }
            return;
        }

        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        if inner.failure_count >= self.settings.threshold && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "Circuit breaker opened"
            );
        }
    }
}

/// Records the call's outcome; a guard dropped without completing counts as a failure
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    started: Instant,
    done: bool,
}

impl CallGuard<'_> {
    fn complete(mut self, success: bool) {
        self.done = true;
        self.breaker.record(success, self.started.elapsed());
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.record(false, self.started.elapsed());
        }
    }
}
