//! Submission API.
//!
//! Every tenant endpoint requires the `ocp-apim-subscription-key` header;
//! an unknown or missing key yields 401 with an empty body before any work
//! happens. `/healthz`, `/stats` and `/metrics` are operational surfaces and
//! skip tenant auth.

mod handlers;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::bootstrap::SharedHubState;
use crate::telemetry;

/// Header carrying the tenant subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "ocp-apim-subscription-key";

/// Resolve the tenant subscription key from request headers.
pub(crate) fn authenticate(headers: &HeaderMap, state: &SharedHubState) -> Result<String, ()> {
    let key = headers
        .get(SUBSCRIPTION_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(())?;

    if state.tenants.get(key).is_none() {
        return Err(());
    }

    Ok(key.to_string())
}

/// Build the API router.
pub fn router(state: SharedHubState) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping_handler))
        .route("/api/message", post(handlers::submit_handler))
        .route("/api/messages", post(handlers::submit_batch_handler))
        .route(
            "/api/messages/{id}/status",
            get(handlers::message_status_handler),
        )
        .route(
            "/api/messages/history",
            get(handlers::message_history_handler),
        )
        .route("/healthz", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route("/metrics", get(telemetry::metrics_handler))
        .with_state(state)
}
