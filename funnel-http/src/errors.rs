//! HTTP error types

use crate::types::HttpMethodError;
use funnel_resilience::Retryable;
use std::time::Duration;

/// Message shown to end users when the downstream service cannot be reached
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Service temporarily unavailable, please try again shortly.";

/// Error type for HTTP operations
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Circuit breaker is open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    #[error("Network error: {message}")]
    Network { message: String, transient: bool },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid header value for {0}")]
    InvalidHeaderValue(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HttpError {
    /// Whether a fresh attempt could plausibly succeed
    ///
    /// Connection, timeout, request and body failures are transient;
    /// builder, redirect and decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Network { transient, .. } => *transient,
            HttpError::NetworkError(e) => {
                !(e.is_builder() || e.is_redirect() || e.is_decode())
                    && (e.is_connect() || e.is_timeout() || e.is_request() || e.is_body())
            }
            _ => false,
        }
    }

    /// Whether this error says something about the health of the target
    ///
    /// Requests reqwest could not even build are the caller's mistake.
    pub fn counts_toward_circuit(&self) -> bool {
        match self {
            HttpError::Network { .. } => true,
            HttpError::NetworkError(e) => !e.is_builder(),
            _ => false,
        }
    }

    /// Text suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            HttpError::CircuitOpen { .. }
            | HttpError::Network { .. }
            | HttpError::NetworkError(_) => SERVICE_UNAVAILABLE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Lets transport calls run under [`funnel_resilience::ResilientExecutor`]
/// when the status-code handling of [`crate::ResilientClient`] is not wanted
impl Retryable for HttpError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockTransport};
    use crate::transport::Transport;
    use crate::types::HttpRequest;
    use funnel_resilience::{CircuitBreaker, ResilientExecutor, RetryError, RetryPolicy};

    fn network(transient: bool) -> HttpError {
        HttpError::Network {
            message: "connection reset".to_string(),
            transient,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(network(true).is_transient());
        assert!(!network(false).is_transient());
        assert!(!HttpError::Cancelled.is_transient());
        assert!(!HttpError::InvalidUrl("x".into()).is_transient());
        assert!(!HttpError::CircuitOpen {
            retry_after: Duration::from_secs(1)
        }
        .is_transient());
    }

    #[test]
    fn test_circuit_accounting() {
        assert!(network(true).counts_toward_circuit());
        assert!(network(false).counts_toward_circuit());
        assert!(!HttpError::Cancelled.counts_toward_circuit());
        assert!(!HttpError::InvalidHeaderName("bad".into()).counts_toward_circuit());
        assert!(!HttpError::ConfigError("bad".into()).counts_toward_circuit());
    }

    #[test]
    fn test_user_message() {
        let open = HttpError::CircuitOpen {
            retry_after: Duration::from_secs(12),
        };
        assert_eq!(open.user_message(), SERVICE_UNAVAILABLE_MESSAGE);
        assert_eq!(network(true).user_message(), SERVICE_UNAVAILABLE_MESSAGE);
        assert_eq!(HttpError::Cancelled.user_message(), "Request cancelled");
    }

    #[test]
    fn test_builder_errors_do_not_count() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(err.is_builder());

        let err = HttpError::from(err);
        assert!(!err.counts_toward_circuit());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_retryable_impl() {
        assert!(network(true).is_retryable());
        assert!(!network(false).is_retryable());
        assert_eq!(network(true).retry_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_under_resilient_executor() {
        let mock = MockTransport::new()
            .then(MockReply::transient_failure("reset"))
            .then(MockReply::transient_failure("reset"))
            .then(MockReply::status(200))
            .otherwise(MockReply::fatal_failure("tls handshake"));
        let request = HttpRequest::get("https://crm.example.com/health").unwrap();
        let executor = ResilientExecutor::new(
            CircuitBreaker::with_defaults(),
            RetryPolicy::default().without_jitter(),
        );

        let response = executor
            .execute(|| mock.send(request.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(mock.call_count(), 3);

        let err = executor
            .execute(|| mock.send(request.clone()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetryError::NonRetryableError(HttpError::Network { transient: false, .. })
        ));
        assert_eq!(mock.call_count(), 4);
        assert_eq!(executor.circuit_breaker().snapshot().failure_count, 1);
    }
}
