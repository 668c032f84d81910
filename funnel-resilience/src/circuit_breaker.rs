//! Circuit breaker pattern implementation

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// Circuit is half-open, limited requests allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Wire representation, as sent in the `X-Circuit-State` header
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Number of successes in half-open state before closing
    pub success_threshold: u32,

    /// Time to wait after the last failure before probing again
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum number of trial calls in flight while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Check the configuration invariants
    pub fn validate(&self) -> Result<(), BreakerConfigError> {
        if self.failure_threshold == 0 {
            return Err(BreakerConfigError::ZeroThreshold("failure_threshold"));
        }
        if self.success_threshold == 0 {
            return Err(BreakerConfigError::ZeroThreshold("success_threshold"));
        }
        if self.half_open_max_calls == 0 {
            return Err(BreakerConfigError::ZeroThreshold("half_open_max_calls"));
        }
        Ok(())
    }

    /// Copy with every counter raised to at least 1
    fn normalized(mut self) -> Self {
        if self.validate().is_err() {
            log::warn!(
                "Circuit breaker config has zero limits, raising them to 1: {:?}",
                self
            );
            self.failure_threshold = self.failure_threshold.max(1);
            self.success_threshold = self.success_threshold.max(1);
            self.half_open_max_calls = self.half_open_max_calls.max(1);
        }
        self
    }
}

/// Invalid circuit breaker configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BreakerConfigError {
    #[error("{0} must be at least 1")]
    ZeroThreshold(&'static str),
}

/// Lifetime counters for a circuit breaker
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    /// Calls admitted through the breaker
    pub total_requests: u64,
    /// Admitted calls that succeeded
    pub total_successes: u64,
    /// Admitted calls that failed
    pub total_failures: u64,
    /// Calls rejected without being attempted
    pub total_rejected: u64,
    /// Last state change time
    pub last_state_change: Option<Instant>,
}

/// Point-in-time view of a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure: Option<Instant>,
    pub metrics: CircuitMetrics,
}

/// Error returned by [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call without invoking the operation
    #[error("Circuit breaker is open, retry after {retry_after:?}")]
    Open { retry_after: Duration },

    /// The operation ran and failed
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was rejected by an open circuit
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// Get the operation's error if the operation ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open { .. } => None,
            CircuitBreakerError::Inner(error) => Some(error),
        }
    }
}

/// Thread-safe circuit breaker
///
/// Clones share the same state, so one breaker can guard every call to a
/// downstream target regardless of which task makes it. The state lock is
/// never held across an `.await`.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    half_open_in_flight: u32,
    metrics: CircuitMetrics,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            half_open_in_flight: 0,
            metrics: CircuitMetrics::default(),
        }
    }
}

enum Outcome {
    Success,
    Failure,
    Ignored,
}

/// Admission ticket for one call. Dropping it without settling (for
/// example when the caller's future is cancelled) frees the trial slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
}

impl Permit<'_> {
    fn settle(mut self, outcome: Outcome) {
        let trial = std::mem::replace(&mut self.trial, false);
        self.breaker.record(trial, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial {
            self.breaker.record(true, Outcome::Ignored);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// Zero thresholds or a zero half-open limit are raised to 1; call
    /// [`CircuitBreakerConfig::validate`] first to reject them instead.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config.normalized()),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` under the breaker; every error counts as a failure
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_filtered(operation, |_| true).await
    }

    /// Run `operation` under the breaker, counting only the errors for which
    /// `counts_as_failure` returns true. Other errors are passed through
    /// without touching the counters.
    pub async fn execute_filtered<F, Fut, T, E, P>(
        &self,
        operation: F,
        counts_as_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let permit = self
            .admit()
            .map_err(|retry_after| CircuitBreakerError::Open { retry_after })?;

        match operation().await {
            Ok(value) => {
                permit.settle(Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                let outcome = if counts_as_failure(&error) {
                    Outcome::Failure
                } else {
                    Outcome::Ignored
                };
                permit.settle(outcome);
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Get the current state, counters and metrics
    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        CircuitSnapshot {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure: state.last_failure,
            metrics: state.metrics.clone(),
        }
    }

    /// Get lifetime metrics
    pub fn metrics(&self) -> CircuitMetrics {
        self.state.lock().metrics.clone()
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = CircuitBreakerState::new();
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker reset to closed state");
    }

    // Internal methods

    /// Decide whether a call may proceed. On rejection returns how long
    /// until the breaker will probe again.
    fn admit(&self) -> Result<Permit<'_>, Duration> {
        let mut state = self.state.lock();

        if state.state == CircuitState::Open {
            let elapsed = state
                .last_failure
                .map(|at| at.elapsed())
                .unwrap_or(self.config.timeout);

            if elapsed < self.config.timeout {
                state.metrics.total_rejected += 1;
                return Err(self.config.timeout - elapsed);
            }

            self.transition_to_half_open(&mut state);
        }

        let trial = state.state == CircuitState::HalfOpen;
        if trial {
            if state.half_open_in_flight >= self.config.half_open_max_calls {
                state.metrics.total_rejected += 1;
                return Err(Duration::ZERO);
            }
            state.half_open_in_flight += 1;
        }

        state.metrics.total_requests += 1;
        Ok(Permit {
            breaker: self,
            trial,
        })
    }

    fn record(&self, trial: bool, outcome: Outcome) {
        let mut state = self.state.lock();

        if trial {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
        }

        match outcome {
            Outcome::Success => self.record_success(&mut state),
            Outcome::Failure => self.record_failure(&mut state),
            Outcome::Ignored => {}
        }
    }

    fn record_success(&self, state: &mut CircuitBreakerState) {
        state.metrics.total_successes += 1;
        state.failure_count = 0;

        if state.state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                self.transition_to_closed(state);
            }
        }
    }

    fn record_failure(&self, state: &mut CircuitBreakerState) {
        state.metrics.total_failures += 1;
        state.last_failure = Some(Instant::now());

        match state.state {
            CircuitState::HalfOpen => {
                // A single failed trial reopens the circuit
                self.transition_to_open(state);
            }
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    self.transition_to_open(state);
                }
            }
            CircuitState::Open => {
                state.failure_count += 1;
            }
        }
    }

    fn transition_to_open(&self, state: &mut CircuitBreakerState) {
        let from = state.state;
        state.state = CircuitState::Open;
        state.success_count = 0;
        state.metrics.last_state_change = Some(Instant::now());
        log::warn!(
            "Circuit breaker opened from {} after {} consecutive failures",
            from,
            state.failure_count
        );
    }

    fn transition_to_closed(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker closed after successful recovery");
    }

    fn transition_to_half_open(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::HalfOpen;
        state.success_count = 0;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker transitioned to half-open state");
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &state.state)
            .field("failure_count", &state.failure_count)
            .field("success_count", &state.success_count)
            .finish()
    }
}

/// Builder for circuit breaker configuration
pub struct CircuitBreakerBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
        }
    }

    /// Set failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set success threshold for recovery
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set timeout before attempting recovery
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set how many trial calls may run concurrently while half-open
    pub fn half_open_max_calls(mut self, max: u32) -> Self {
        self.config.half_open_max_calls = max;
        self
    }

    /// Build the circuit breaker, raising zero limits to 1
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.config)
    }

    /// Build the circuit breaker, rejecting an invalid configuration
    pub fn try_build(self) -> Result<CircuitBreaker, BreakerConfigError> {
        self.config.validate()?;
        Ok(CircuitBreaker::new(self.config))
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
