//! Submission API handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bootstrap::SharedHubState;
use crate::store::{MessageId, MessageQuery, MessageStatus, StoredMessage, MAX_LIST_LIMIT};
use crate::submit::{SubmitError, SubmitRequest};

use super::authenticate;

/// Simple error body for 400/404/500 responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Liveness probe body, kept minimal.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /healthz
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Hub statistics body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub tenants: usize,
    pub messages: MessageStats,
}

#[derive(Debug, Serialize)]
pub struct MessageStats {
    pub total: u64,
    pub queued: u64,
    pub processing: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// GET /stats
pub async fn stats_handler(State(state): State<SharedHubState>) -> impl IntoResponse {
    let repo = state.repository.stats().await;

    Json(StatsResponse {
        uptime_seconds: state.uptime_secs(),
        tenants: state.tenants.len(),
        messages: MessageStats {
            total: repo.total,
            queued: repo.queued,
            processing: repo.processing,
            sent: repo.sent,
            delivered: repo.delivered,
            failed: repo.failed,
        },
    })
}

/// GET /ping
pub async fn ping_handler(
    State(state): State<SharedHubState>,
    headers: HeaderMap,
) -> Response {
    if authenticate(&headers, &state).is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    "Service is alive".into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageRequest {
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub channel_type: String,
}

impl From<&SubmitMessageRequest> for SubmitRequest {
    fn from(dto: &SubmitMessageRequest) -> Self {
        Self {
            recipient: dto.recipient.clone(),
            message: dto.message.clone(),
            channel_type: dto.channel_type.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageResponse {
    pub message_id: MessageId,
    pub status: &'static str,
    pub status_url: String,
}

fn status_url(id: MessageId) -> String {
    format!("/api/messages/{id}/status")
}

/// POST /api/message
pub async fn submit_handler(
    State(state): State<SharedHubState>,
    headers: HeaderMap,
    Json(body): Json<SubmitMessageRequest>,
) -> Response {
    let Ok(subscription_key) = authenticate(&headers, &state) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match state
        .submission
        .submit(&subscription_key, &SubmitRequest::from(&body))
        .await
    {
        Ok(receipt) => Json(SubmitMessageResponse {
            message_id: receipt.message_id,
            status: "Queued",
            status_url: status_url(receipt.message_id),
        })
        .into_response(),
        Err(e) => submit_error_response(e),
    }
}

fn submit_error_response(e: SubmitError) -> Response {
    if e.is_validation() {
        error_response(StatusCode::BAD_REQUEST, e.to_string())
    } else {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchSubmitRequest {
    #[serde(default)]
    pub messages: Vec<SubmitMessageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub status: &'static str,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitResponse {
    pub results: Vec<BatchItemResponse>,
    pub status_url_pattern: &'static str,
    pub total_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
}

/// POST /api/messages
pub async fn submit_batch_handler(
    State(state): State<SharedHubState>,
    headers: HeaderMap,
    Json(body): Json<BatchSubmitRequest>,
) -> Response {
    let Ok(subscription_key) = authenticate(&headers, &state) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let requests: Vec<SubmitRequest> = body.messages.iter().map(SubmitRequest::from).collect();

    match state
        .submission
        .submit_batch(&subscription_key, &requests)
        .await
    {
        Ok(result) => {
            let results = result
                .items
                .into_iter()
                .map(|item| BatchItemResponse {
                    status: if item.message_id.is_some() {
                        "Queued"
                    } else {
                        "Failed"
                    },
                    message_id: item.message_id,
                    recipient: item.recipient,
                    error_message: item.error,
                })
                .collect();

            Json(BatchSubmitResponse {
                results,
                status_url_pattern: "/api/messages/{messageId}/status",
                total_count: result.total,
                success_count: result.success,
                failed_count: result.failed,
            })
            .into_response()
        }
        Err(e) => submit_error_response(e),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusResponse {
    pub message_id: MessageId,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub recipient: String,
    pub channel_type: crate::store::ChannelType,
}

impl From<StoredMessage> for MessageStatusResponse {
    fn from(msg: StoredMessage) -> Self {
        Self {
            message_id: msg.id,
            status: msg.status,
            created_at: msg.created_at,
            updated_at: msg.updated_at,
            external_message_id: msg.external_message_id,
            error_message: msg.error_message,
            retry_count: msg.retry_count,
            recipient: msg.recipient,
            channel_type: msg.channel_type,
        }
    }
}

/// GET /api/messages/{id}/status
pub async fn message_status_handler(
    State(state): State<SharedHubState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let Ok(subscription_key) = authenticate(&headers, &state) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let Ok(message_id) = id.parse::<MessageId>() else {
        return error_response(StatusCode::NOT_FOUND, "message not found");
    };

    match state
        .repository
        .get_for_tenant(message_id, &subscription_key)
        .await
    {
        Ok(Some(message)) => Json(MessageStatusResponse::from(message)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
    pub status: Option<String>,
}

/// GET /api/messages/history
pub async fn message_history_handler(
    State(state): State<SharedHubState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Response {
    let Ok(subscription_key) = authenticate(&headers, &state) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let mut query = MessageQuery::new().with_limit(params.limit.unwrap_or(MAX_LIST_LIMIT));

    if let Some(status) = &params.status {
        match MessageStatus::parse(status) {
            Some(status) => query = query.with_status(status),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown status filter: {status}"),
                );
            }
        }
    }

    match state
        .repository
        .list_for_tenant(&subscription_key, &query)
        .await
    {
        Ok(messages) => {
            let body: Vec<MessageStatusResponse> = messages
                .into_iter()
                .map(MessageStatusResponse::from)
                .collect();
            Json(body).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
