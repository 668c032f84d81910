//! Resilient HTTP client: retry with exponential backoff inside a circuit breaker

use crate::config::HttpConfig;
use crate::errors::HttpError;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{HttpMethod, HttpRequest, HttpResponse};
use funnel_resilience::{CircuitBreaker, CircuitBreakerError, CircuitState, RetryPolicy};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Header telling the server whether this attempt is a retry
pub const RETRY_ATTEMPT_HEADER: HeaderName = HeaderName::from_static("x-retry-attempt");

/// Header carrying the breaker state at the time of the attempt
pub const CIRCUIT_STATE_HEADER: HeaderName = HeaderName::from_static("x-circuit-state");

/// How a logical call ended, as seen by the circuit breaker
enum CallFailure {
    /// Retries ran out on a 429 or 5xx; the caller still gets the response
    Exhausted(HttpResponse),
    Error(HttpError),
}

impl CallFailure {
    fn counts_toward_circuit(&self) -> bool {
        match self {
            CallFailure::Exhausted(_) => true,
            CallFailure::Error(e) => e.counts_toward_circuit(),
        }
    }
}

/// What to do after one attempt
enum Step {
    Done(HttpResponse),
    Retry { delay: Duration, reason: String },
    GiveUp(CallFailure),
}

/// HTTP client that retries transient failures and stops calling a
/// failing target through a shared circuit breaker
///
/// Clones share the transport and the breaker.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    base_url: Option<Url>,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("breaker", &self.breaker)
            .field("policy", &self.policy)
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResilientClient {
    /// Create a client backed by `reqwest`
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        config
            .retry
            .validate()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;
        config
            .circuit_breaker
            .validate()
            .map_err(|e| HttpError::ConfigError(format!("circuit_breaker: {}", e)))?;

        let transport = ReqwestTransport::new(&config)?;
        let mut client = Self::with_transport(
            Arc::new(transport),
            config.retry,
            CircuitBreaker::new(config.circuit_breaker),
        );

        if let Some(ref base_url) = config.base_url {
            client = client.with_base_url(base_url)?;
        }
        if let Some(token) = config.bearer_token {
            client = client.with_bearer_token(token);
        }

        Ok(client)
    }

    /// Create a client over any transport and breaker
    ///
    /// Passing a clone of an existing breaker makes several clients share
    /// one view of the target's health.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            transport,
            breaker,
            policy,
            base_url: None,
            bearer_token: None,
        }
    }

    /// Resolve relative paths passed to the verb helpers against `base_url`
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, HttpError> {
        // A trailing slash keeps the last path segment when joining
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let url = Url::parse(&normalized)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Attach `Authorization: Bearer <token>` to requests made through the
    /// verb helpers
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Default retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Send `request` with the client's default policy
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.fetch_with_retry(request, &self.policy).await
    }

    /// Send `request`, retrying 429, 5xx and transient network failures
    ///
    /// Exhausted 429/5xx responses are returned as `Ok`; exhausted network
    /// failures are returned as `Err`. The whole call is one breaker
    /// outcome. Total time is bounded only by the per-attempt timeout and
    /// the backoff schedule; use [`Self::fetch_with_cancellation`] for an
    /// overall deadline.
    pub async fn fetch_with_retry(
        &self,
        request: HttpRequest,
        policy: &RetryPolicy,
    ) -> Result<HttpResponse, HttpError> {
        self.run(request, policy, None).await
    }

    /// As [`Self::fetch_with_retry`], abandoning the call when `token` is
    /// cancelled. Cancellation is observed before each attempt, during each
    /// attempt and during each backoff sleep.
    pub async fn fetch_with_cancellation(
        &self,
        request: HttpRequest,
        policy: &RetryPolicy,
        token: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        self.run(request, policy, Some(token)).await
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        let request = self.prepare(HttpMethod::Get, path)?;
        self.fetch(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse, HttpError> {
        let request = self.prepare(HttpMethod::Delete, path)?;
        self.fetch(request).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, HttpError> {
        let request = self.prepare(HttpMethod::Post, path)?.json(body)?;
        self.fetch(request).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, HttpError> {
        let request = self.prepare(HttpMethod::Put, path)?.json(body)?;
        self.fetch(request).await
    }

    pub async fn patch_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, HttpError> {
        let request = self.prepare(HttpMethod::Patch, path)?.json(body)?;
        self.fetch(request).await
    }

    /// Build a request for `path`, applying base URL and bearer token
    pub fn prepare(&self, method: HttpMethod, path: &str) -> Result<HttpRequest, HttpError> {
        let request = HttpRequest::from_url(method, self.resolve(path)?);
        match self.bearer_token {
            Some(ref token) => request.bearer_auth(token),
            None => Ok(request),
        }
    }

    fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        // Only web URLs bypass base_url; "leads:batch" is a relative path
        if let Ok(url) = Url::parse(path) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }

        let base = self.base_url.as_ref().ok_or_else(|| {
            HttpError::InvalidUrl(format!("{} is relative and no base_url is set", path))
        })?;

        // The "./" prefix stops a colon in the first segment reading as a scheme
        base.join(&format!("./{}", path.trim_start_matches('/')))
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn run(
        &self,
        request: HttpRequest,
        policy: &RetryPolicy,
        token: Option<&CancellationToken>,
    ) -> Result<HttpResponse, HttpError> {
        policy
            .validate()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;

        let outcome = self
            .breaker
            .execute_filtered(
                || self.attempt_loop(request, policy, token),
                CallFailure::counts_toward_circuit,
            )
            .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(CircuitBreakerError::Open { retry_after }) => {
                info!("Circuit open, request rejected for another {:?}", retry_after);
                Err(HttpError::CircuitOpen { retry_after })
            }
            Err(CircuitBreakerError::Inner(CallFailure::Exhausted(response))) => Ok(response),
            Err(CircuitBreakerError::Inner(CallFailure::Error(e))) => Err(e),
        }
    }

    async fn attempt_loop(
        &self,
        request: HttpRequest,
        policy: &RetryPolicy,
        token: Option<&CancellationToken>,
    ) -> Result<HttpResponse, CallFailure> {
        let backoff = policy.backoff();
        let mut attempt: u32 = 0;

        loop {
            if token.is_some_and(|t| t.is_cancelled()) {
                return Err(CallFailure::Error(HttpError::Cancelled));
            }

            let outgoing = self.stamp(request.clone(), attempt);
            let result = cancellable(self.transport.send(outgoing), token)
                .await
                .and_then(|r| r);

            let has_more = attempt + 1 < policy.max_attempts;
            let step = match result {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if has_more {
                        let delay = match response.retry_after() {
                            Some(requested) => backoff.add_jitter(requested),
                            None => backoff.calculate_delay(attempt),
                        };
                        Step::Retry {
                            delay,
                            reason: "rate limited (429)".to_string(),
                        }
                    } else {
                        Step::GiveUp(CallFailure::Exhausted(response))
                    }
                }
                Ok(response) if response.status().is_server_error() => {
                    if has_more {
                        Step::Retry {
                            delay: backoff.calculate_delay(attempt),
                            reason: format!("server error ({})", response.status().as_u16()),
                        }
                    } else {
                        Step::GiveUp(CallFailure::Exhausted(response))
                    }
                }
                Ok(response) => Step::Done(response),
                Err(e) if e.is_transient() && has_more => Step::Retry {
                    delay: backoff.calculate_delay(attempt),
                    reason: e.to_string(),
                },
                Err(e) => Step::GiveUp(CallFailure::Error(e)),
            };

            match step {
                Step::Done(response) => {
                    debug!(
                        "{} {} completed with {} after {} attempt(s)",
                        request.method,
                        request.url,
                        response.status(),
                        attempt + 1
                    );
                    return Ok(response);
                }
                Step::GiveUp(failure) => {
                    if let CallFailure::Exhausted(ref response) = failure {
                        warn!(
                            "{} {} still failing with {} after {} attempts",
                            request.method,
                            request.url,
                            response.status(),
                            attempt + 1
                        );
                    }
                    return Err(failure);
                }
                Step::Retry { delay, reason } => {
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "{} {} failed: {}, retrying",
                        request.method,
                        request.url,
                        reason
                    );
                    cancellable(tokio::time::sleep(delay), token)
                        .await
                        .map_err(CallFailure::Error)?;
                    attempt += 1;
                }
            }
        }
    }

    /// Copy of `request` carrying the retry and circuit headers
    fn stamp(&self, mut request: HttpRequest, attempt: u32) -> HttpRequest {
        let retrying = if attempt > 0 { "true" } else { "false" };
        request
            .headers
            .insert(RETRY_ATTEMPT_HEADER, HeaderValue::from_static(retrying));
        request.headers.insert(
            CIRCUIT_STATE_HEADER,
            HeaderValue::from_static(self.breaker.state().as_str()),
        );
        request
    }
}

/// Race `future` against `token`, if there is one
async fn cancellable<F: Future>(
    future: F,
    token: Option<&CancellationToken>,
) -> Result<F::Output, HttpError> {
    match token {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(HttpError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}
