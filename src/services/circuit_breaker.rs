//! Failure isolation for unreliable external dependencies.
//!
//! CLOSED lets calls through and counts consecutive failures. Reaching the
//! threshold opens the circuit; while OPEN every call is rejected without touching
//! the dependency. Once the reset timeout elapses the breaker turns HALF_OPEN and
//! admits exactly one trial call: success closes it, failure re-opens it.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    /// Upper bound on a single guarded call
    pub timeout: Duration,
    /// How long the circuit stays open before a trial call is allowed
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(thiserror::Error, Debug)]
pub enum BreakerError {
    #[error("circuit '{0}' is open")]
    Open(&'static str),
    #[error(transparent)]
    Failed(AppError),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Records a failure when an admitted call is dropped before completing.
/// A caller giving up on a hung dependency counts like a timeout, and a
/// cancelled trial cannot wedge the breaker in HALF_OPEN.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(breaker = self.breaker.name, "Call cancelled before completing");
            self.breaker.on_failure();
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state, promoting OPEN to HALF_OPEN for reporting once the reset timeout passed
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(opened_at))
                if opened_at.elapsed() >= self.config.reset_timeout =>
            {
                BreakerState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Runs `f` if the circuit admits it, bounded by the configured timeout
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open(self.name));
        }

        let mut guard = CallGuard {
            breaker: self,
            settled: false,
        };

        let outcome = match tokio::time::timeout(self.config.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} call exceeded {}ms",
                self.name,
                self.config.timeout.as_millis()
            ))),
        };

        guard.settled = true;
        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Failed(e))
            }
        }
    }

    /// Whether a call may proceed; marks the half-open trial as in flight
    fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let ready = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if !ready {
                    return false;
                }
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = true;
                tracing::info!(breaker = self.name, "Circuit half-open, admitting trial call");
                true
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = self.name, "Circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                tracing::warn!(breaker = self.name, "Trial call failed, circuit re-opened");
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        breaker = self.name,
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Counters stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
