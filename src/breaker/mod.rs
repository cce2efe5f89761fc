//! Circuit breaker for remote operations
//!
//! A per-dependency guard that stops calling a failing dependency for a
//! cooldown period. Pure state-machine logic: no timers, no background
//! tasks. Time is read through an injectable [`Clock`] so the reset
//! timeout can be tested with a fake clock.
//!
//! States:
//! - **Closed**: calls run; consecutive failures are counted and reset on
//!   success. Reaching `fail_max` opens the circuit.
//! - **Open**: calls are rejected without attempting the operation. After
//!   `reset_timeout` elapses the next call becomes the half-open trial.
//! - **HalfOpen**: exactly one trial call is admitted; concurrent callers
//!   are rejected as if the circuit were still open. Trial success closes
//!   the circuit, trial failure re-opens it.

mod config;


pub use config::BreakerConfig;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::{BreakerMetrics, STATE_CLOSED, STATE_HALF_OPEN, STATE_OPEN};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn as_gauge(self) -> u8 {
        match self {
            BreakerState::Closed => STATE_CLOSED,
            BreakerState::Open => STATE_OPEN,
            BreakerState::HalfOpen => STATE_HALF_OPEN,
        }
    }
}

/// Error returned by breaker-wrapped calls
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not attempted
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The operation ran and failed
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Extract the inner operation error, if any
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Inner(e) => Some(e),
        }
    }
}

/// Source of "now" for the reset timeout logic
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<std::time::Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(std::time::Duration::ZERO),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial call is in flight
    trial_in_flight: bool,
}

/// Outcome of the admission check, decided under the state lock
enum Admission {
    /// `trial` marks this call as the single half-open trial
    Admit { trial: bool },
    Reject,
}

/// Releases the half-open trial slot if the trial future is dropped
/// before completing (caller timeout, task abort). Without this the
/// breaker would stay wedged in HalfOpen rejecting everything.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.inner.lock();
            if inner.state == BreakerState::HalfOpen {
                inner.trial_in_flight = false;
            }
        }
    }
}

/// Circuit breaker keyed to one remote operation class
///
/// All state transitions happen under a single mutex, so two concurrent
/// callers during HalfOpen can never both be treated as the trial.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
    metrics: Arc<BreakerMetrics>,
}

impl CircuitBreaker {
    /// Create a breaker with the system clock
    pub fn new(name: impl Into<String>, operation: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(name, operation, config, Arc::new(SystemClock))
    }

    /// Create a breaker with an injected clock (tests use [`ManualClock`])
    pub fn with_clock(
        name: impl Into<String>,
        operation: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        Self {
            metrics: Arc::new(BreakerMetrics::new(name.clone(), operation)),
            name,
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metrics handle for registration with the crate-wide exporter
    pub fn metrics(&self) -> Arc<BreakerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current state (primarily for tests and health reporting)
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Run `op` through the breaker
    ///
    /// Returns [`BreakerError::Open`] without attempting the operation when
    /// the circuit is open (or a half-open trial is already in flight).
    /// The operation's own error is passed through as
    /// [`BreakerError::Inner`].
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = match self.admit() {
            Admission::Reject => {
                self.metrics.record_rejection();
                debug!(breaker = %self.name, "call rejected, circuit open");
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                });
            }
            Admission::Admit { trial } => trial,
        };

        let mut guard = TrialGuard {
            breaker: self,
            armed: trial,
        };
        match op().await {
            Ok(value) => {
                guard.armed = false;
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                guard.armed = false;
                self.on_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Admission::Admit { trial: false },
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| self.clock.now().saturating_duration_since(at))
                    .unwrap_or_default();
                if elapsed >= self.config.reset_timeout() {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.trial_in_flight = true;
                    Admission::Admit { trial: true }
                } else {
                    Admission::Reject
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    Admission::Reject
                } else {
                    inner.trial_in_flight = true;
                    Admission::Admit { trial: true }
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        self.metrics.record_success();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.trial_in_flight = false;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, BreakerState::Closed);
            }
            // A success cannot be observed while Open: Open admits nothing.
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        self.metrics.record_failure();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.fail_max {
                    inner.opened_at = Some(self.clock.now());
                    self.transition(&mut inner, BreakerState::Open);
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, circuit opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.trial_in_flight = false;
                inner.opened_at = Some(self.clock.now());
                self.transition(&mut inner, BreakerState::Open);
                warn!(breaker = %self.name, "half-open trial failed, circuit re-opened");
            }
            BreakerState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        self.metrics.record_state_change(to.as_gauge());
        info!(
            breaker = %self.name,
            from = ?from,
            to = ?to,
            "circuit breaker state changed"
        );
    }
}
