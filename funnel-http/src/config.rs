//! HTTP client runtime configuration

use funnel_config::domains::http::HttpConfig as ConfigHttpConfig;
use funnel_resilience::{CircuitBreakerConfig, RetryPolicy};
use std::time::Duration;

/// Runtime configuration for [`crate::ResilientClient`]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-attempt request timeout
    pub timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Maximum number of redirects to follow
    pub max_redirects: u32,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,

    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,

    /// How long idle connections are kept
    pub pool_idle_timeout: Duration,

    /// Base URL for relative request paths
    pub base_url: Option<String>,

    /// Bearer token attached to every request
    pub bearer_token: Option<String>,

    /// Default retry policy
    pub retry: RetryPolicy,

    /// Circuit breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        ConfigHttpConfig::default().into()
    }
}

impl From<ConfigHttpConfig> for HttpConfig {
    fn from(config: ConfigHttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            connect_timeout: config.connection_pool.connection_timeout,
            max_redirects: config.max_redirects,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
            pool_max_idle_per_host: config.connection_pool.max_idle_per_host,
            pool_idle_timeout: config.connection_pool.idle_timeout,
            base_url: config.base_url,
            bearer_token: config.bearer_token,
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                base_delay: config.retry.base_delay,
                max_delay: config.retry.max_delay,
                backoff_multiplier: config.retry.backoff_multiplier,
                jitter: config.retry.jitter,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker.failure_threshold,
                success_threshold: config.circuit_breaker.success_threshold,
                timeout: config.circuit_breaker.timeout,
                half_open_max_calls: config.circuit_breaker.half_open_max_calls,
            },
        }
    }
}
