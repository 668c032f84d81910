//! Transport seam between the resilient client and the network

use crate::config::HttpConfig;
use crate::errors::HttpError;
use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Sends a single HTTP attempt
///
/// Implementations perform exactly one physical call per `send`; retries
/// and circuit breaking live in [`crate::ResilientClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Production transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport from client configuration
    pub fn new(config: &HttpConfig) -> Result<Self, HttpError> {
        debug!(
            "Creating HTTP transport with {}s timeout",
            config.timeout.as_secs()
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(reqwest::redirect::Policy::limited(
                config.max_redirects as usize,
            ))
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        debug!("Sending {} request to {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!("HTTP response received: {} ({} bytes)", status, body.len());
        Ok(HttpResponse::new(status, headers, body))
    }
}
