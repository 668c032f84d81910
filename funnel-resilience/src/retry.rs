//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::BackoffCalculator;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};

/// Retry policy configuration
///
/// Immutable once built; the delay before retrying after attempt `n`
/// (0-indexed) is `min(base_delay * backoff_multiplier^n, max_delay)` plus
/// a uniform jitter in `[0, jitter)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound for the exponential part of the delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Exclusive upper bound of the random jitter added to each delay
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Copy of this policy with a different attempt limit
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Copy of this policy with a different base and max delay
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Copy of this policy without jitter, for deterministic delays
    pub fn without_jitter(mut self) -> Self {
        self.jitter = Duration::ZERO;
        self
    }

    /// Check the policy invariants
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::NoAttempts);
        }

        if self.max_delay < self.base_delay {
            return Err(PolicyError::DelayRange {
                base_delay: self.base_delay,
                max_delay: self.max_delay,
            });
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::Multiplier(self.backoff_multiplier));
        }

        Ok(())
    }

    /// Backoff calculator for this policy
    pub fn backoff(&self) -> BackoffCalculator {
        BackoffCalculator::new(
            self.base_delay,
            self.max_delay,
            self.backoff_multiplier,
            self.jitter,
        )
    }

    /// Delay for a specific attempt (0-indexed), without jitter
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff().base_delay(attempt)
    }

    /// Delay for a specific attempt (0-indexed), with jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff().calculate_delay(attempt)
    }
}

/// Invalid retry policy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("max_delay ({max_delay:?}) must not be smaller than base_delay ({base_delay:?})")]
    DelayRange {
        base_delay: Duration,
        max_delay: Duration,
    },

    #[error("backoff_multiplier must be a finite number >= 1.0, got {0}")]
    Multiplier(f64),
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Server-provided delay that overrides the backoff schedule
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

/// Retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Create with default policy
    pub fn with_default_policy() -> Self {
        Self::new(RetryPolicy::default())
    }

    /// Get the policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        self.execute_with_context(|_attempt| f()).await
    }

    /// Execute a function with retry logic and attempt context (1-indexed)
    pub async fn execute_with_context<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            debug!(
                "Executing attempt {} of {}",
                attempt, self.policy.max_attempts
            );

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(RetryError::NonRetryableError(error));
                    }

                    if attempt >= self.policy.max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = match error.retry_delay() {
                        Some(hint) => self.policy.backoff().add_jitter(hint),
                        None => self.policy.delay_for_attempt(attempt - 1),
                    };

                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );
                    sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }
}

/// Circuit breaker wrapped around a retry executor
///
/// The breaker sees one outcome per logical call: a call that retries
/// three times and then fails counts as a single failure.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    breaker: CircuitBreaker,
    retry: RetryExecutor,
}

impl ResilientExecutor {
    /// Create a new executor from a shared breaker and a retry policy
    pub fn new(breaker: CircuitBreaker, policy: RetryPolicy) -> Self {
        Self {
            breaker,
            retry: RetryExecutor::new(policy),
        }
    }

    /// Get the circuit breaker
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Execute a function with circuit breaker and retry logic
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let result = self.breaker.execute(|| self.retry.execute(f)).await;

        match result {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open { retry_after }) => {
                warn!("Circuit breaker rejected call, retry after {:?}", retry_after);
                Err(RetryError::CircuitBreakerOpen { retry_after })
            }
            Err(CircuitBreakerError::Inner(error)) => Err(error),
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Non-retryable error encountered
    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),

    /// Circuit breaker is open
    #[error("Circuit breaker is open, retry after {retry_after:?}")]
    CircuitBreakerOpen { retry_after: Duration },
}

impl<E> RetryError<E> {
    /// Get the underlying error if present
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => Some(last_error),
            RetryError::NonRetryableError(error) => Some(error),
            RetryError::CircuitBreakerOpen { .. } => None,
        }
    }

    /// Check if this represents a circuit breaker open error
    pub fn is_circuit_breaker_open(&self) -> bool {
        matches!(self, RetryError::CircuitBreakerOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerBuilder, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug, Clone)]
    struct TestError {
        retryable: bool,
        message: String,
        retry_after: Option<Duration>,
    }

    impl TestError {
        fn transient(message: &str) -> Self {
            Self {
                retryable: true,
                message: message.to_string(),
                retry_after: None,
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }

        fn retry_delay(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_delays(Duration::from_millis(10), Duration::from_millis(100))
            .without_jitter()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(5000));
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_base_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay_for_attempt(20), Duration::from_millis(5000));
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(
            RetryPolicy::default().with_max_attempts(0).validate(),
            Err(PolicyError::NoAttempts)
        );

        let inverted = RetryPolicy::default()
            .with_delays(Duration::from_secs(2), Duration::from_secs(1));
        assert!(matches!(
            inverted.validate(),
            Err(PolicyError::DelayRange { .. })
        ));

        let shrinking = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert_eq!(shrinking.validate(), Err(PolicyError::Multiplier(0.5)));
    }

    #[test]
    fn test_policy_from_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str(
            r#"
max_attempts: 5
base_delay: 250ms
jitter: 0s
"#,
        )
        .unwrap();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_millis(5000));
        assert_eq!(policy.jitter, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(fast_policy(3));

        let result = executor
            .execute(|| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 2 {
                        Err(TestError::transient("Temporary failure"))
                    } else {
                        Ok("Success".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_max_attempts_exceeded() {
        let executor = RetryExecutor::new(fast_policy(2));

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| async { Err(TestError::transient("Always fails")) })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::MaxAttemptsExceeded { attempts: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error() {
        let counter = AtomicU32::new(0);
        let executor = RetryExecutor::with_default_policy();

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| {
                counter.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(TestError {
                        retryable: false,
                        message: "Non-retryable".to_string(),
                        retry_after: None,
                    })
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::NonRetryableError(_)
        ));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_context() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let executor = RetryExecutor::new(fast_policy(3));

        let result = executor
            .execute_with_context(|attempt| {
                attempts_clone.store(attempt, Ordering::Relaxed);
                async move {
                    if attempt < 3 {
                        Err(TestError::transient(&format!("Attempt {}", attempt)))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let executor = RetryExecutor::new(
            RetryPolicy::default()
                .with_max_attempts(3)
                .without_jitter(),
        );
        let start = Instant::now();

        let _: Result<(), RetryError<TestError>> = executor
            .execute(|| async { Err(TestError::transient("down")) })
            .await;

        // 100ms after the first attempt, 200ms after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_hint_overrides_backoff() {
        let executor = RetryExecutor::new(fast_policy(2));
        let start = Instant::now();

        let _: Result<(), RetryError<TestError>> = executor
            .execute(|| async {
                Err(TestError {
                    retry_after: Some(Duration::from_secs(2)),
                    ..TestError::transient("slow down")
                })
            })
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilient_executor_counts_logical_calls() {
        let breaker = CircuitBreakerBuilder::new().failure_threshold(2).build();
        let executor = ResilientExecutor::new(breaker.clone(), fast_policy(3));
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result: Result<(), _> = executor
                .execute(|| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    async { Err(TestError::transient("down")) }
                })
                .await;
            assert!(matches!(
                result,
                Err(RetryError::MaxAttemptsExceeded { attempts: 3, .. })
            ));
        }

        // Six physical attempts, two logical failures
        assert_eq!(calls.load(Ordering::Relaxed), 6);
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected: Result<(), _> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Ok::<_, TestError>(()) }
            })
            .await;
        assert!(rejected.unwrap_err().is_circuit_breaker_open());
        assert_eq!(calls.load(Ordering::Relaxed), 6);
    }
}
