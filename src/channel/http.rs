//! HTTP SMS provider channel.
//!
//! One pooled `reqwest` client and one resilience pipeline per tenant, built
//! at startup, so failures in one tenant's provider never trip another's
//! breaker. The send path: rate-limit admission → payload render → auth
//! header synthesis → resilient POST → external-id extraction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::config::{AuthKind, HttpChannelConfig, TenantConfig};
use crate::payload::{build_payload, PayloadInput};
use crate::queue::MessageQueuedEvent;
use crate::ratelimit::TenantRateLimiter;
use crate::resilience::{is_retryable_status, PipelineError, ResiliencePipeline};
use crate::telemetry::counters;

use super::{ChannelResult, MessageChannel};

/// Keys probed, in order, for the provider-assigned message id.
const EXTERNAL_ID_KEYS: [&str; 6] = ["messageId", "id", "message_id", "sid", "uuid", "reference"];

/// How much of an error body is kept in the error message.
const ERROR_BODY_LIMIT: usize = 512;

struct TenantHttpClient {
    config: HttpChannelConfig,
    client: reqwest::Client,
    pipeline: ResiliencePipeline,
}

/// HTTP delivery channel across all tenants.
pub struct HttpChannel {
    clients: HashMap<String, TenantHttpClient>,
    limiter: Arc<TenantRateLimiter>,
}

impl HttpChannel {
    pub fn new(
        tenants: &HashMap<String, TenantConfig>,
        limiter: Arc<TenantRateLimiter>,
    ) -> anyhow::Result<Self> {
        let mut clients = HashMap::new();

        for (key, tenant) in tenants {
            if let Some(http) = &tenant.http {
                let client = reqwest::Client::builder()
                    .build()
                    .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

                clients.insert(
                    key.clone(),
                    TenantHttpClient {
                        pipeline: ResiliencePipeline::new(http),
                        config: http.clone(),
                        client,
                    },
                );
            }
        }

        Ok(Self { clients, limiter })
    }
}

#[async_trait]
impl MessageChannel for HttpChannel {
    async fn send(&self, event: &MessageQueuedEvent) -> ChannelResult {
        let tenant_key = event.subscription_key.as_str();

        let Some(entry) = self.clients.get(tenant_key) else {
            return ChannelResult::permanent("HTTP channel not configured for tenant");
        };

        if !self
            .limiter
            .try_acquire(tenant_key, entry.config.max_requests_per_second)
            .await
        {
            return ChannelResult::transient("Rate limit exceeded");
        }

        let payload = build_payload(
            &PayloadInput {
                message_id: event.message_id,
                tenant_key,
                recipient: &event.recipient,
                content: &event.content,
            },
            &entry.config,
        );

        debug!(
            message_id = %event.message_id,
            tenant = %tenant_key,
            endpoint = %entry.config.endpoint,
            "sending via HTTP provider"
        );

        let response = entry
            .pipeline
            .execute(|| build_request(entry, &payload).send())
            .await;

        match response {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let external_id = response
                        .json::<serde_json::Value>()
                        .await
                        .ok()
                        .as_ref()
                        .and_then(extract_external_id);

                    counters::message_sent(tenant_key, "HTTP");
                    ChannelResult::success(external_id)
                } else {
                    let transient = is_retryable_status(status);
                    let body = response.text().await.unwrap_or_default();
                    let body = truncate(&body, ERROR_BODY_LIMIT);

                    warn!(
                        message_id = %event.message_id,
                        tenant = %tenant_key,
                        status = %status,
                        "HTTP provider rejected message"
                    );

                    ChannelResult {
                        ok: false,
                        external_id: None,
                        error: Some(format!("HTTP {}: {}", status.as_u16(), body)),
                        transient,
                    }
                }
            }
            Err(PipelineError::Open) => {
                counters::breaker_rejected(tenant_key);
                ChannelResult::transient("Circuit breaker open")
            }
            Err(e) => ChannelResult::transient(e.to_string()),
        }
    }
}

/// Build one request attempt with auth and custom headers applied.
fn build_request(entry: &TenantHttpClient, payload: &str) -> reqwest::RequestBuilder {
    let config = &entry.config;

    let mut request = entry
        .client
        .post(&config.endpoint)
        .header(CONTENT_TYPE, "application/json")
        .timeout(config.timeout)
        .body(payload.to_string());

    request = match config.auth {
        AuthKind::Bearer => request.bearer_auth(&config.api_key),
        AuthKind::ApiKey => request.header("X-API-Key", &config.api_key),
        AuthKind::Basic => request.basic_auth(&config.api_key, config.api_secret.as_deref()),
        // No dedicated header synthesis; falls back to Bearer when a key is set.
        AuthKind::Hmac => {
            if config.api_key.is_empty() {
                request
            } else {
                request.bearer_auth(&config.api_key)
            }
        }
    };

    for (name, value) in &config.custom_headers {
        request = request.header(name.as_str(), value.as_str());
    }

    request
}

/// Extract the provider-assigned id: first hit in the ordered key list,
/// else `data.id`, else none.
fn extract_external_id(value: &serde_json::Value) -> Option<String> {
    for key in EXTERNAL_ID_KEYS {
        if let Some(id) = value.get(key).and_then(scalar_to_string) {
            return Some(id);
        }
    }

    value
        .get("data")
        .and_then(|data| data.get("id"))
        .and_then(scalar_to_string)
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_external_id_ordered_keys() {
        let body = json!({ "id": "second", "messageId": "first" });
        assert_eq!(extract_external_id(&body).as_deref(), Some("first"));

        let body = json!({ "sid": "SM123" });
        assert_eq!(extract_external_id(&body).as_deref(), Some("SM123"));

        let body = json!({ "reference": 42 });
        assert_eq!(extract_external_id(&body).as_deref(), Some("42"));
    }

    #[test]
    fn test_extract_external_id_nested_data() {
        let body = json!({ "data": { "id": "nested-1" } });
        assert_eq!(extract_external_id(&body).as_deref(), Some("nested-1"));
    }

    #[test]
    fn test_extract_external_id_absent() {
        let body = json!({ "status": "accepted" });
        assert_eq!(extract_external_id(&body), None);

        let body = json!({ "id": "" });
        assert_eq!(extract_external_id(&body), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // Multi-byte char straddling the limit is dropped whole.
        assert_eq!(truncate("héllo", 2), "h");
    }
}
