//! Outbound HTTP resilience pipeline: Timeout → Retry → CircuitBreaker.
//!
//! One pipeline per tenant HTTP client so a failing tenant endpoint cannot
//! trip another tenant's breaker. Each attempt is bounded by the configured
//! timeout; retryable outcomes (connect errors, timeouts, 408/429/5xx) back
//! off exponentially with jitter; the breaker fails fast once consecutive
//! failures cross the threshold.

mod breaker;

pub use breaker::{CircuitBreaker, CircuitState};

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::HttpChannelConfig;

/// Terminal pipeline failures. Retryable HTTP responses that exhaust their
/// retries are returned as `Ok(response)` so the caller can surface the
/// provider's status and body.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("circuit breaker open")]
    Open,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(String),
}

impl PipelineError {
    /// All pipeline errors are transient from the worker's point of view:
    /// timeouts and connect errors may recover, and an open breaker means no
    /// attempt was made at all.
    pub fn is_transient(&self) -> bool {
        true
    }
}

/// Check whether a response status should be retried.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Tenant-scoped resilience pipeline.
pub struct ResiliencePipeline {
    timeout: Duration,
    max_retries: u32,
    breaker: CircuitBreaker,
}

impl ResiliencePipeline {
    pub fn new(config: &HttpChannelConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_retries: config.max_retries,
            breaker: CircuitBreaker::new(&config.circuit_breaker),
        }
    }

    /// Current breaker state, for observability.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Execute a request through the pipeline. `attempt_fn` builds and sends
    /// one attempt; it is invoked once per try.
    pub async fn execute<F, Fut>(&self, mut attempt_fn: F) -> Result<reqwest::Response, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        if !self.breaker.allow_request() {
            debug!("request rejected, circuit open");
            return Err(PipelineError::Open);
        }

        let mut last_error: Option<PipelineError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_with_jitter(attempt);
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying request");
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.timeout, attempt_fn()).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if is_retryable_status(status) {
                        self.breaker.record_failure();
                        warn!(status = %status, attempt, "retryable response status");

                        if attempt == self.max_retries {
                            // Hand the final response back so the caller can
                            // report the provider's status and body.
                            return Ok(response);
                        }
                        continue;
                    }

                    // 2xx, 3xx and non-429 4xx complete the exchange.
                    self.breaker.record_success();
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    self.breaker.record_failure();
                    warn!(error = %e, attempt, "request error");
                    last_error = Some(PipelineError::Transport(e.to_string()));
                }
                Err(_) => {
                    self.breaker.record_failure();
                    warn!(timeout_ms = self.timeout.as_millis() as u64, attempt, "attempt timed out");
                    last_error = Some(PipelineError::Timeout(self.timeout));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::Transport("request failed".into())))
    }
}

/// `2^attempt` seconds plus 0–1000 ms uniform jitter.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = Duration::from_secs(1 << attempt.min(6));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    base + jitter
}
