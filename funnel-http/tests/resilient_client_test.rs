//! End-to-end tests against a local mock server

use funnel_http::{HttpConfig, HttpError, HttpMethod, HttpRequest, ResilientClient, RetryPolicy};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_delays(Duration::from_millis(5), Duration::from_millis(20))
        .without_jitter()
}

fn client_for(server: &MockServer) -> ResilientClient {
    let config = HttpConfig {
        base_url: Some(format!("{}/api/v4", server.uri())),
        bearer_token: Some("integration-token".to_string()),
        retry: fast_policy(3),
        ..HttpConfig::default()
    };
    ResilientClient::new(config).unwrap()
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/users"))
        .and(header("x-retry-attempt", "false"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v4/users"))
        .and(header("x-retry-attempt", "true"))
        .and(header("x-circuit-state", "CLOSED"))
        .and(header("authorization", "Bearer integration-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server).get("users").await.unwrap();

    assert_eq!(response.status(), 200);
    let users: Vec<serde_json::Value> = response.json().unwrap();
    assert_eq!(users[0]["id"], 1);
}

#[tokio::test]
async fn test_persistent_500_returns_last_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client.get("reports").await.unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(response.text(), "boom");
    assert_eq!(client.circuit_breaker().snapshot().failure_count, 1);
}

#[tokio::test]
async fn test_not_found_is_returned_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server).get("missing").await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v4/contacts"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v4/contacts"))
        .and(body_json(serde_json::json!({"email": "ada@example.com"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let started = std::time::Instant::now();
    let response = client
        .post_json("contacts", &serde_json::json!({"email": "ada@example.com"}))
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_connection_refused_is_raised_after_retries() {
    let config = HttpConfig {
        retry: fast_policy(2),
        ..HttpConfig::default()
    };
    let client = ResilientClient::new(config).unwrap();
    let request = HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:1/health").unwrap();

    let err = client.fetch(request).await.unwrap_err();

    assert!(matches!(err, HttpError::NetworkError(_)));
    assert!(err.is_transient());
    assert_eq!(
        err.user_message(),
        "Service temporarily unavailable, please try again shortly."
    );
}
