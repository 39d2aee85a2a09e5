//! SMPP delivery channel.
//!
//! Per-tenant pooled sessions created on first submit. Content is segmented
//! with UDH concatenation headers when it exceeds a single part; per-part
//! submit responses are classified into the worker's error taxonomy, with
//! ESME_RTHROTTLED driving an escalating per-tenant backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, OnceCell};
use tracing::{debug, info, warn};

use crate::bootstrap::ShutdownState;
use crate::config::{SmppChannelConfig, TenantConfig};
use crate::queue::MessageQueuedEvent;
use crate::resilience::CircuitBreaker;
use crate::smpp::pdu::SubmitSm;
use crate::smpp::{CommandStatus, DlrCorrelator, PoolError, SmppPool};
use crate::store::SharedRepository;
use crate::telemetry::counters;

use super::{ChannelResult, MessageChannel};

/// Single-part payload limit for the default data coding.
const SINGLE_PART_LIMIT: usize = 160;

/// Per-part payload limit once a 6-byte UDH concatenation header is added.
const CONCAT_PART_LIMIT: usize = 153;

/// Capacity of the per-tenant deliver_sm channel feeding the correlator.
const DLR_CHANNEL_CAPACITY: usize = 1024;

struct TenantRuntime {
    pool: Arc<SmppPool>,
    correlator: Arc<DlrCorrelator>,
}

struct SmppTenant {
    key: String,
    config: SmppChannelConfig,
    repository: SharedRepository,
    shutdown_rx: watch::Receiver<ShutdownState>,
    runtime: OnceCell<TenantRuntime>,
    /// Consecutive ESME_RTHROTTLED responses
    throttle_hits: AtomicU32,
    /// Concatenation reference counter
    concat_ref: AtomicU32,
    breaker: CircuitBreaker,
}

impl SmppTenant {
    /// Pool and correlator are created on the first submit for the tenant.
    async fn runtime(&self) -> &TenantRuntime {
        self.runtime
            .get_or_init(|| async {
                info!(tenant = %self.key, host = %self.config.host, "starting SMPP runtime");

                let (dlr_tx, dlr_rx) = mpsc::channel(DLR_CHANNEL_CAPACITY);

                let correlator = DlrCorrelator::new(
                    self.key.clone(),
                    self.repository.clone(),
                    self.config.delivery_receipts.retention_days,
                );
                correlator.spawn(dlr_rx, self.shutdown_rx.clone());

                let pool = Arc::new(SmppPool::new(self.key.clone(), self.config.clone(), dlr_tx));
                pool.warm().await;

                TenantRuntime { pool, correlator }
            })
            .await
    }

    /// Escalating backoff after an ESME_RTHROTTLED response.
    fn throttle_backoff(&self) -> std::time::Duration {
        let hits = self.throttle_hits.fetch_add(1, Ordering::SeqCst) + 1;
        let throttling = &self.config.throttling;

        let multiplier = u64::from(throttling.multiplier.max(1));
        let factor = multiplier.saturating_pow(hits.saturating_sub(1).min(16));
        let backoff_ms = (throttling.initial_backoff.as_millis() as u64)
            .saturating_mul(factor)
            .min(throttling.max_backoff.as_millis() as u64);

        std::time::Duration::from_millis(backoff_ms)
    }

    fn build_parts(&self, event: &MessageQueuedEvent) -> Vec<SubmitSm> {
        let registered_delivery = if self.config.delivery_receipts.enabled {
            self.config.delivery_receipts.dlr_mask
        } else {
            0
        };

        let segments = segment_content(&event.content);
        let total = segments.len();

        if total == 1 {
            let mut submit = SubmitSm::new(
                0,
                self.config.source_address.clone(),
                event.recipient.clone(),
                segments.into_iter().next().unwrap(),
            );
            submit.registered_delivery = registered_delivery;
            return vec![submit];
        }

        let reference = (self.concat_ref.fetch_add(1, Ordering::Relaxed) & 0xFF) as u8;

        segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| {
                let mut body = vec![0x05, 0x00, 0x03, reference, total as u8, (index + 1) as u8];
                body.extend_from_slice(&segment);

                let mut submit = SubmitSm::new(
                    0,
                    self.config.source_address.clone(),
                    event.recipient.clone(),
                    body,
                );
                submit.registered_delivery = registered_delivery;
                submit.esm_class = 0x40; // UDHI
                submit
            })
            .collect()
    }
}

/// SMPP delivery channel across all tenants.
pub struct SmppChannel {
    tenants: HashMap<String, Arc<SmppTenant>>,
}

impl SmppChannel {
    pub fn new(
        tenants: &HashMap<String, TenantConfig>,
        repository: SharedRepository,
        shutdown_rx: watch::Receiver<ShutdownState>,
    ) -> Self {
        let tenants = tenants
            .iter()
            .filter_map(|(key, tenant)| {
                tenant.smpp.as_ref().map(|smpp| {
                    (
                        key.clone(),
                        Arc::new(SmppTenant {
                            key: key.clone(),
                            config: smpp.clone(),
                            repository: repository.clone(),
                            shutdown_rx: shutdown_rx.clone(),
                            runtime: OnceCell::new(),
                            throttle_hits: AtomicU32::new(0),
                            concat_ref: AtomicU32::new(0),
                            breaker: CircuitBreaker::new(&smpp.circuit_breaker),
                        }),
                    )
                })
            })
            .collect();

        Self { tenants }
    }

    /// Unbind every tenant pool. Called once during drain.
    pub async fn shutdown(&self) {
        for tenant in self.tenants.values() {
            if let Some(runtime) = tenant.runtime.get() {
                runtime.pool.shutdown().await;
            }
        }
    }
}

#[async_trait]
impl MessageChannel for SmppChannel {
    async fn send(&self, event: &MessageQueuedEvent) -> ChannelResult {
        let Some(tenant) = self.tenants.get(&event.subscription_key) else {
            return ChannelResult::permanent("SMPP channel not configured for tenant");
        };

        if !tenant.breaker.allow_request() {
            counters::breaker_rejected(&tenant.key);
            return ChannelResult::transient("Circuit breaker open");
        }

        let runtime = tenant.runtime().await;

        let client = match runtime.pool.get().await {
            Ok(client) => client,
            Err(e @ (PoolError::AcquireTimeout(_) | PoolError::Closed)) => {
                tenant.breaker.record_failure();
                return ChannelResult::transient(format!("No SMPP connection available: {e}"));
            }
            Err(PoolError::Connect(e)) => {
                tenant.breaker.record_failure();
                return ChannelResult::transient(format!("SMPP connect failed: {e}"));
            }
        };

        let parts = tenant.build_parts(event);
        let total_parts = parts.len();
        let mut external_id: Option<String> = None;

        for (index, part) in parts.into_iter().enumerate() {
            let outcome = match client.submit(part).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        message_id = %event.message_id,
                        tenant = %tenant.key,
                        part = index + 1,
                        error = %e,
                        "submit_sm failed"
                    );
                    tenant.breaker.record_failure();
                    return ChannelResult::transient(format!("SMPP submit failed: {e}"));
                }
            };

            match outcome.status {
                CommandStatus::Ok => {
                    if external_id.is_none() {
                        external_id = outcome.message_id;
                    }
                }
                CommandStatus::Throttled => {
                    let backoff = tenant.throttle_backoff();
                    warn!(
                        message_id = %event.message_id,
                        tenant = %tenant.key,
                        backoff_ms = backoff.as_millis() as u64,
                        "SMSC throttled submission, backing off"
                    );
                    tenant.breaker.record_failure();
                    counters::smpp_throttled(&tenant.key);
                    tokio::time::sleep(backoff).await;
                    return ChannelResult::transient("SMPP throttled (ESME_RTHROTTLED)");
                }
                CommandStatus::MessageQueueFull
                | CommandStatus::SubmitFailed
                | CommandStatus::SystemError => {
                    tenant.breaker.record_failure();
                    return ChannelResult::transient(format!("SMPP: {}", outcome.status));
                }
                other => {
                    return ChannelResult::permanent(format!("SMPP: {other}"));
                }
            }
        }

        tenant.throttle_hits.store(0, Ordering::SeqCst);
        tenant.breaker.record_success();

        debug!(
            message_id = %event.message_id,
            tenant = %tenant.key,
            parts = total_parts,
            external_id = external_id.as_deref().unwrap_or("-"),
            "message submitted via SMPP"
        );

        if let Some(external) = &external_id {
            runtime
                .correlator
                .store_correlation(event.message_id, external)
                .await;
        }

        counters::message_sent(&tenant.key, "SMPP");
        ChannelResult::success(external_id)
    }
}

/// Split content into SMS parts at char boundaries.
fn segment_content(content: &str) -> Vec<Vec<u8>> {
    if content.len() <= SINGLE_PART_LIMIT {
        return vec![content.as_bytes().to_vec()];
    }

    let mut segments = Vec::new();
    let mut current = Vec::new();

    for ch in content.chars() {
        let mut buf = [0u8; 4];
        let encoded = ch.encode_utf8(&mut buf).as_bytes();

        if current.len() + encoded.len() > CONCAT_PART_LIMIT {
            segments.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(encoded);
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_single_part() {
        let parts = segment_content("hello");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], b"hello");
    }

    #[test]
    fn test_boundary_content_single_part() {
        let content = "a".repeat(SINGLE_PART_LIMIT);
        assert_eq!(segment_content(&content).len(), 1);
    }

    #[test]
    fn test_long_content_segmented() {
        let content = "a".repeat(400);
        let parts = segment_content(&content);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), CONCAT_PART_LIMIT);
        assert_eq!(parts[1].len(), CONCAT_PART_LIMIT);
        assert_eq!(parts[2].len(), 400 - 2 * CONCAT_PART_LIMIT);

        let total: usize = parts.iter().map(Vec::len).sum();
        assert_eq!(total, 400);
    }

    #[test]
    fn test_segmentation_respects_char_boundaries() {
        // 3-byte chars; 153 is divisible by 3, so force a misalignment with
        // a leading ASCII byte.
        let content = format!("x{}", "€".repeat(120));
        let parts = segment_content(&content);

        let reassembled: Vec<u8> = parts.concat();
        assert_eq!(String::from_utf8(reassembled).unwrap(), content);
        for part in &parts {
            assert!(part.len() <= CONCAT_PART_LIMIT);
            assert!(std::str::from_utf8(part).is_ok());
        }
    }
}
