//! Scripted transport for tests and offline runs

use crate::errors::HttpError;
use crate::transport::Transport;
use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(HttpResponse),
    Failure { message: String, transient: bool },
}

impl MockReply {
    /// Empty response with the given status
    pub fn status(status: u16) -> Self {
        MockReply::Response(HttpResponse::from_status(status))
    }

    /// Response with the given status and a single header
    ///
    /// Header names are case-insensitive; an invalid name or value is
    /// logged and left out.
    pub fn status_with_header(status: u16, name: &str, value: &str) -> Self {
        let mut headers = HeaderMap::new();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Ignoring invalid mock header {}: {}", name, value),
        }
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        MockReply::Response(HttpResponse::new(status, headers, Vec::new()))
    }

    /// JSON response
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(body).unwrap_or_default();
        MockReply::Response(HttpResponse::new(status, headers, body))
    }

    /// Transport failure that is worth retrying
    pub fn transient_failure(message: impl Into<String>) -> Self {
        MockReply::Failure {
            message: message.into(),
            transient: true,
        }
    }

    /// Transport failure that is not worth retrying
    pub fn fatal_failure(message: impl Into<String>) -> Self {
        MockReply::Failure {
            message: message.into(),
            transient: false,
        }
    }

    fn into_result(self) -> Result<HttpResponse, HttpError> {
        match self {
            MockReply::Response(response) => Ok(response),
            MockReply::Failure { message, transient } => {
                Err(HttpError::Network { message, transient })
            }
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    received: Vec<HttpRequest>,
}

/// Transport that replays a script and records what it was sent
///
/// Scripted replies are consumed in order; once the script is exhausted the
/// fallback reply (if any) is repeated. Without a fallback an exhausted
/// script answers with a non-transient network error.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that always gives the same reply
    pub fn always(reply: MockReply) -> Self {
        Self::new().otherwise(reply)
    }

    /// Append a reply to the script
    pub fn then(self, reply: MockReply) -> Self {
        self.state.lock().script.push_back(reply);
        self
    }

    /// Reply used once the script is exhausted
    pub fn otherwise(self, reply: MockReply) -> Self {
        self.state.lock().fallback = Some(reply);
        self
    }

    /// Simulated time spent on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.state.lock().received.len()
    }

    /// Copies of every request received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().received.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        debug!("Mock transport received {} {}", request.method, request.url);

        let reply = {
            let mut state = self.state.lock();
            state.received.push(request);
            state.script.pop_front().or_else(|| state.fallback.clone())
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(reply) => reply.into_result(),
            None => Err(HttpError::Network {
                message: "mock transport has no scripted reply".to_string(),
                transient: false,
            }),
        }
    }
}
