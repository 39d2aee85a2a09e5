//! End-to-end delivery tests against a mock HTTP SMS provider.
//!
//! Boots the full hub (API + delivery worker) and a stub provider endpoint,
//! then observes the message state machine through the status API.

use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use smshubd::bootstrap::Hub;
use smshubd::config::Config;

const KEY_HEADER: &str = "ocp-apim-subscription-key";

/// Stub SMS provider capturing hit counts and returning a scripted status.
struct MockProvider {
    hits: AtomicUsize,
    status: AtomicU16,
}

impl MockProvider {
    async fn start(status: u16) -> (Arc<Self>, String) {
        let provider = Arc::new(Self {
            hits: AtomicUsize::new(0),
            status: AtomicU16::new(status),
        });

        let router = Router::new()
            .route("/send", post(mock_send))
            .with_state(provider.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        (provider, format!("http://{addr}/send"))
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn mock_send(State(provider): State<Arc<MockProvider>>) -> impl IntoResponse {
    let hit = provider.hits.fetch_add(1, Ordering::SeqCst) + 1;
    let status = StatusCode::from_u16(provider.status.load(Ordering::SeqCst)).unwrap();

    (status, Json(json!({ "id": format!("prov-{hit}") })))
}

struct TestHub {
    base_url: String,
    client: reqwest::Client,
    _hub: Hub,
}

impl TestHub {
    async fn start(config_yaml: &str) -> Self {
        let config = Config::from_yaml(config_yaml).expect("config");
        let mut hub = Hub::new(config).expect("hub");
        hub.start().expect("start");

        let router = hub.api_router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            _hub: hub,
        }
    }

    async fn submit(&self, recipient: &str) -> String {
        let body: Value = self
            .client
            .post(format!("{}/api/message", self.base_url))
            .header(KEY_HEADER, "demo-key")
            .json(&json!({
                "recipient": recipient,
                "message": "hi there",
                "channelType": "HTTP",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        body["messageId"].as_str().expect("messageId").to_string()
    }

    async fn status(&self, id: &str) -> Value {
        self.client
            .get(format!("{}/api/messages/{id}/status", self.base_url))
            .header(KEY_HEADER, "demo-key")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn wait_for_status(&self, id: &str, expected: &str, timeout: Duration) -> Value {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let status = self.status(id).await;
            if status["status"] == expected {
                return status;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("message {id} never reached {expected}, last: {status}");
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

fn config_yaml(endpoint: &str, extra_http: &str) -> String {
    format!(
        r#"
queue:
  redelivery_delay: 250ms
tenants:
  demo-key:
    name: Demo
    http:
      endpoint: "{endpoint}"
      api_key: secret
      timeout: 2s
{extra_http}
"#
    )
}

#[tokio::test]
async fn test_happy_path_message_reaches_sent() {
    let (provider, endpoint) = MockProvider::start(200).await;
    let hub = TestHub::start(&config_yaml(&endpoint, "      max_retries: 1")).await;

    let id = hub.submit("+1234567890").await;
    let status = hub
        .wait_for_status(&id, "Sent", Duration::from_secs(5))
        .await;

    assert_eq!(status["externalMessageId"], "prov-1");
    assert_eq!(status["retryCount"], 0);
    assert_eq!(provider.hits(), 1);
}

#[tokio::test]
async fn test_provider_4xx_fails_permanently_without_retry() {
    let (provider, endpoint) = MockProvider::start(400).await;
    let hub = TestHub::start(&config_yaml(&endpoint, "      max_retries: 3")).await;

    let id = hub.submit("+1234567890").await;
    let status = hub
        .wait_for_status(&id, "Failed", Duration::from_secs(5))
        .await;

    assert!(status["errorMessage"]
        .as_str()
        .unwrap()
        .starts_with("HTTP 400"));
    assert_eq!(status["retryCount"], 0);
    // 4xx is not retryable at any layer.
    assert_eq!(provider.hits(), 1);
}

#[tokio::test]
async fn test_circuit_breaker_fails_fast_after_threshold() {
    let (provider, endpoint) = MockProvider::start(500).await;
    let hub = TestHub::start(&config_yaml(
        &endpoint,
        r#"      max_retries: 0
      circuit_breaker:
        failure_threshold: 2
        recovery_timeout: 60s"#,
    ))
    .await;

    // First two sends reach the provider and trip the breaker; the rest
    // fail fast without an outbound call. With a zero retry budget every
    // transient failure lands in Failed immediately.
    for _ in 0..4 {
        let id = hub.submit("+1234567890").await;
        hub.wait_for_status(&id, "Failed", Duration::from_secs(5))
            .await;
    }

    assert_eq!(provider.hits(), 2);
}

#[tokio::test]
async fn test_rate_limited_messages_eventually_deliver() {
    let (provider, endpoint) = MockProvider::start(200).await;
    let hub = TestHub::start(&config_yaml(
        &endpoint,
        r#"      max_retries: 20
      max_requests_per_second: 2"#,
    ))
    .await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(hub.submit(&format!("+1999000000{i}")).await);
    }

    // Two proceed immediately; the rest bounce off the limiter and are
    // redelivered until permits return.
    for id in &ids {
        hub.wait_for_status(id, "Sent", Duration::from_secs(15))
            .await;
    }

    assert_eq!(provider.hits(), 5);
}
