//! Configuration loading and environment variable handling

use crate::domains::FunnelConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "FUNNEL".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<FunnelConfig> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config: FunnelConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<FunnelConfig> {
        let mut config = FunnelConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<FunnelConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut FunnelConfig) -> ConfigResult<()> {
        self.apply_http_overrides(&mut config.http)?;
        self.apply_retry_overrides(&mut config.http.retry)?;
        self.apply_circuit_overrides(&mut config.http.circuit_breaker)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply HTTP config overrides
    fn apply_http_overrides(
        &self,
        config: &mut crate::domains::http::HttpConfig,
    ) -> ConfigResult<()> {
        if let Some(seconds) = self.parse_env_var::<u64>("HTTP_TIMEOUT")? {
            config.timeout = Duration::from_secs(seconds);
        }

        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Some(verify_ssl) = self.parse_env_var::<bool>("HTTP_VERIFY_SSL")? {
            config.verify_ssl = verify_ssl;
        }

        if let Ok(base_url) = self.get_env_var("HTTP_BASE_URL") {
            config.base_url = Some(base_url);
        }

        if let Ok(token) = self.get_env_var("HTTP_BEARER_TOKEN") {
            config.bearer_token = Some(token);
        }

        Ok(())
    }

    /// Apply retry policy overrides
    fn apply_retry_overrides(
        &self,
        config: &mut crate::domains::http::RetrySettings,
    ) -> ConfigResult<()> {
        if let Some(attempts) = self.parse_env_var::<u32>("RETRY_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }

        if let Some(millis) = self.parse_env_var::<u64>("RETRY_BASE_DELAY_MS")? {
            config.base_delay = Duration::from_millis(millis);
        }

        if let Some(millis) = self.parse_env_var::<u64>("RETRY_MAX_DELAY_MS")? {
            config.max_delay = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Apply circuit breaker overrides
    fn apply_circuit_overrides(
        &self,
        config: &mut crate::domains::http::CircuitBreakerSettings,
    ) -> ConfigResult<()> {
        if let Some(threshold) = self.parse_env_var::<u32>("CIRCUIT_FAILURE_THRESHOLD")? {
            config.failure_threshold = threshold;
        }

        if let Some(seconds) = self.parse_env_var::<u64>("CIRCUIT_TIMEOUT")? {
            config.timeout = Duration::from_secs(seconds);
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Parse an optional environment variable
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e))),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
