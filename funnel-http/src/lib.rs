//! Resilient HTTP client for Funnel
//!
//! Requests go through a [`Transport`] (real `reqwest` or a scripted mock)
//! and are retried with exponential backoff on rate limiting, server
//! errors and transient network failures. A shared circuit breaker stops
//! calling a target that keeps failing.

pub mod client;
pub mod config;
pub mod errors;
pub mod mock;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ResilientClient, CIRCUIT_STATE_HEADER, RETRY_ATTEMPT_HEADER};
pub use config::HttpConfig;
pub use errors::{HttpError, SERVICE_UNAVAILABLE_MESSAGE};
pub use mock::{MockReply, MockTransport};
pub use transport::{ReqwestTransport, Transport};
pub use types::{HttpMethod, HttpMethodError, HttpRequest, HttpResponse};

pub use funnel_resilience::{CircuitBreaker, CircuitState, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
