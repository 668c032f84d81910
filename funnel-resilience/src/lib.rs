//! Resilience patterns for Funnel
//!
//! This crate provides the circuit breaker, exponential backoff and retry
//! policy used by the HTTP client, plus a registry for keeping one breaker
//! per downstream target.

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod retry;

// Re-export commonly used types
pub use backoff::BackoffCalculator;
pub use circuit_breaker::{
    BreakerConfigError, CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig,
    CircuitBreakerError, CircuitMetrics, CircuitSnapshot, CircuitState,
};
pub use registry::CircuitBreakerRegistry;
pub use retry::{PolicyError, ResilientExecutor, RetryError, RetryExecutor, RetryPolicy, Retryable};
