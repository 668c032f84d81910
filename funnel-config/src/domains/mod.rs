//! Domain-specific configuration modules

pub mod http;
pub mod logging;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Funnel configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FunnelConfig {
    /// HTTP client configuration, including retry and circuit breaker
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl FunnelConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.http.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = FunnelConfig::default();
        let body = serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config\n".to_string());

        format!(
            "# Funnel configuration\n\
             # Every key is optional; omitted keys use the defaults shown here.\n\
             # http.base_url and http.bearer_token can also be set through\n\
             # FUNNEL_HTTP_BASE_URL and FUNNEL_HTTP_BEARER_TOKEN.\n{}",
            body
        )
    }
}
