//! Prometheus counters for the delivery pipeline.
//!
//! Registered against the default registry; the API router's `/metrics`
//! endpoint encodes them in text exposition format.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};

/// `/metrics` handler body.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let output = String::from_utf8(buffer).unwrap_or_default();
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                output,
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Error encoding metrics: {e}"),
        ),
    }
}

pub mod counters {
    use once_cell::sync::Lazy;
    use prometheus::{register_int_counter_vec, IntCounterVec};

    static MESSAGES_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_messages_submitted_total",
            "Messages accepted for delivery",
            &["tenant", "channel"]
        )
        .unwrap()
    });

    static MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_messages_sent_total",
            "Messages handed to a downstream provider",
            &["tenant", "channel"]
        )
        .unwrap()
    });

    static MESSAGES_DELIVERED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_messages_delivered_total",
            "Messages confirmed delivered by receipt",
            &["tenant"]
        )
        .unwrap()
    });

    static MESSAGES_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_messages_failed_total",
            "Messages that reached the Failed state",
            &["tenant", "channel"]
        )
        .unwrap()
    });

    static DELIVERIES_RETRIED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_deliveries_retried_total",
            "Transient failures returned to the queue",
            &["tenant"]
        )
        .unwrap()
    });

    static RATE_LIMIT_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_rate_limit_rejected_total",
            "Sends rejected by the tenant rate limiter",
            &["tenant"]
        )
        .unwrap()
    });

    static BREAKER_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_breaker_rejected_total",
            "Sends rejected by an open circuit breaker",
            &["tenant"]
        )
        .unwrap()
    });

    static DLR_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_dlr_received_total",
            "Delivery receipts received",
            &["tenant", "stat"]
        )
        .unwrap()
    });

    static SMPP_CONNECTIONS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_smpp_connections_created_total",
            "SMPP connections bound",
            &["tenant"]
        )
        .unwrap()
    });

    static SMPP_POOL_TIMEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_smpp_pool_timeouts_total",
            "Pool acquisitions that timed out",
            &["tenant"]
        )
        .unwrap()
    });

    static SMPP_THROTTLED: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "smshub_smpp_throttled_total",
            "ESME_RTHROTTLED responses",
            &["tenant"]
        )
        .unwrap()
    });

    pub fn message_submitted(tenant: &str, channel: &str) {
        MESSAGES_SUBMITTED.with_label_values(&[tenant, channel]).inc();
    }

    pub fn message_sent(tenant: &str, channel: &str) {
        MESSAGES_SENT.with_label_values(&[tenant, channel]).inc();
    }

    pub fn message_delivered(tenant: &str) {
        MESSAGES_DELIVERED.with_label_values(&[tenant]).inc();
    }

    pub fn message_failed(tenant: &str, channel: &str) {
        MESSAGES_FAILED.with_label_values(&[tenant, channel]).inc();
    }

    pub fn delivery_retried(tenant: &str) {
        DELIVERIES_RETRIED.with_label_values(&[tenant]).inc();
    }

    pub fn rate_limit_rejected(tenant: &str) {
        RATE_LIMIT_REJECTED.with_label_values(&[tenant]).inc();
    }

    pub fn breaker_rejected(tenant: &str) {
        BREAKER_REJECTED.with_label_values(&[tenant]).inc();
    }

    pub fn dlr_received(tenant: &str, stat: &str) {
        DLR_RECEIVED.with_label_values(&[tenant, stat]).inc();
    }

    pub fn smpp_connection_created(tenant: &str) {
        SMPP_CONNECTIONS_CREATED.with_label_values(&[tenant]).inc();
    }

    pub fn smpp_pool_timeout(tenant: &str) {
        SMPP_POOL_TIMEOUTS.with_label_values(&[tenant]).inc();
    }

    pub fn smpp_throttled(tenant: &str) {
        SMPP_THROTTLED.with_label_values(&[tenant]).inc();
    }
}
