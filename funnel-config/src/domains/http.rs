//! HTTP client configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-attempt request timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_timeout"
    )]
    pub timeout: Duration,

    /// Maximum number of redirects to follow
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whether to verify SSL certificates
    #[serde(default = "crate::domains::utils::default_true")]
    pub verify_ssl: bool,

    /// Base URL that relative request paths are resolved against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bearer token attached to every request; never written back out
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,

    /// Connection pool configuration
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetrySettings,

    /// Circuit breaker guarding the downstream target
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    /// Maximum idle connections per host
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// Idle connection timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_idle_timeout"
    )]
    pub idle_timeout: Duration,

    /// Connection timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_connection_timeout"
    )]
    pub connection_timeout: Duration,
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per logical request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(
        rename = "base_delay_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_base_delay"
    )]
    pub base_delay: Duration,

    /// Cap for the exponential delay
    #[serde(
        rename = "max_delay_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_max_delay"
    )]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound of the random jitter added to each delay
    #[serde(
        rename = "jitter_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_jitter"
    )]
    pub jitter: Duration,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failed requests before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successful trial requests before the circuit closes again
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// How long the circuit stays open before probing
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_open_timeout"
    )]
    pub timeout: Duration,

    /// Concurrent trial requests allowed while half-open
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            verify_ssl: true,
            base_url: None,
            bearer_token: None,
            connection_pool: ConnectionPoolConfig::default(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_max_idle_per_host(),
            idle_timeout: default_idle_timeout(),
            connection_timeout: default_connection_timeout(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout: default_open_timeout(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;

        if let Some(ref base_url) = self.base_url {
            validate_url(base_url, "base_url", self.domain_name())?;
        }

        if let Some(ref token) = self.bearer_token {
            validate_required_string(token, "bearer_token", self.domain_name())?;
        }

        self.connection_pool.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

impl Validatable for ConnectionPoolConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.max_idle_per_host,
            "max_idle_per_host",
            self.domain_name(),
        )?;

        validate_positive(
            self.idle_timeout.as_secs(),
            "idle_timeout",
            self.domain_name(),
        )?;

        validate_positive(
            self.connection_timeout.as_secs(),
            "connection_timeout",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http.connection_pool"
    }
}

impl Validatable for RetrySettings {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_attempts, "max_attempts", self.domain_name())?;

        if self.max_delay < self.base_delay {
            return Err(self.validation_error(format!(
                "max_delay_ms ({}) must not be smaller than base_delay_ms ({})",
                self.max_delay.as_millis(),
                self.base_delay.as_millis()
            )));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(self.validation_error(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http.retry"
    }
}

impl Validatable for CircuitBreakerSettings {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.failure_threshold,
            "failure_threshold",
            self.domain_name(),
        )?;
        validate_positive(
            self.success_threshold,
            "success_threshold",
            self.domain_name(),
        )?;
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        validate_positive(
            self.half_open_max_calls,
            "half_open_max_calls",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http.circuit_breaker"
    }
}

// Default value functions
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_redirects() -> u32 {
    10
}

fn default_user_agent() -> String {
    "Funnel/1.0".to_string()
}

fn default_max_idle_per_host() -> usize {
    10
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(5000)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> Duration {
    Duration::from_millis(1000)
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_half_open_max_calls() -> u32 {
    2
}
