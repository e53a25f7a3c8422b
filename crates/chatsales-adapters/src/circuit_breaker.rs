use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{AdapterError, AdapterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive service failures that open the circuit.
    pub failure_threshold: usize,
    /// Successful trial calls needed in half-open state to close it again.
    pub success_threshold: usize,
    /// How long the circuit stays open before admitting trial calls.
    pub open_timeout: Duration,
    pub half_open_max_requests: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            half_open_max_requests: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: usize,
    successes: usize,
    opened_at: Option<Instant>,
    trials_in_flight: usize,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
            trials_in_flight: 0,
        }
    }
}

/// Holds a half-open trial slot. Released on drop, so a call cancelled mid-flight
/// (for example by an outer timeout) gives its slot back.
struct TrialPermit<'a> {
    breaker: &'a CircuitBreaker,
    half_open: bool,
}

impl Drop for TrialPermit<'_> {
    fn drop(&mut self) {
        if self.half_open {
            self.breaker.release_trial();
        }
    }
}

/// Circuit breaker guarding the inference endpoint.
///
/// Only service-side failures (connection errors, timeouts, 5xx) count
/// toward opening the circuit; a rejected request says nothing about the
/// health of the service.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> AdapterResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let mut permit = self.admit()?;

        let result = operation().await;
        permit.half_open = false;
        match &result {
            Ok(_) => self.record_success(),
            Err(err) if err.is_retryable() => self.record_failure(),
            Err(_) => self.release_trial(),
        }
        result
    }

    fn admit(&self) -> AdapterResult<TrialPermit<'_>> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
            if elapsed < self.config.open_timeout {
                debug!(breaker = %self.name, "Circuit open, rejecting call");
                return Err(AdapterError::CircuitBreakerOpen);
            }
            debug!(breaker = %self.name, "Circuit half-open, admitting trial calls");
            inner.state = CircuitState::HalfOpen;
            inner.successes = 0;
            inner.trials_in_flight = 0;
        }

        let half_open = inner.state == CircuitState::HalfOpen;
        if half_open {
            if inner.trials_in_flight >= self.config.half_open_max_requests {
                return Err(AdapterError::CircuitBreakerOpen);
            }
            inner.trials_in_flight += 1;
        }

        Ok(TrialPermit {
            breaker: self,
            half_open,
        })
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                if inner.successes >= self.config.success_threshold {
                    debug!(breaker = %self.name, "Circuit closed after successful trial calls");
                    *inner = BreakerState::closed();
                }
            }
            CircuitState::Closed | CircuitState::Open => inner.failures = 0,
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if trip {
            warn!(
                breaker = %self.name,
                failures = inner.failures,
                "Circuit opened, inference calls will be rejected"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.successes = 0;
            inner.trials_in_flight = 0;
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new("inference", CircuitBreakerConfig::default())
    }
}
