//! Delivery receipt correlation.
//!
//! Maps SMSC-assigned external message ids back to internal message ids so
//! asynchronous deliver_sm receipts can complete the `Sent → Delivered/Failed`
//! leg of the state machine. A receipt may arrive before the submit path has
//! stored its correlation; such receipts are parked and applied the moment
//! the correlation lands. An hourly sweep drops correlations older than the
//! configured retention.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{MessageId, SharedRepository, StatusUpdate};
use crate::telemetry::counters;

use super::dlr::Dlr;
use super::pdu::DeliverSm;

/// Sweep interval for stale correlations.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// How long an unmatched receipt is parked awaiting its correlation.
const PENDING_RECEIPT_TTL: Duration = Duration::from_secs(600);

struct Correlation {
    message_id: MessageId,
    created_at: Instant,
}

struct PendingReceipt {
    dlr: Dlr,
    received_at: Instant,
}

/// Per-tenant correlator.
pub struct DlrCorrelator {
    tenant: String,
    repository: SharedRepository,
    retention: Duration,
    entries: RwLock<HashMap<String, Correlation>>,
    pending: RwLock<HashMap<String, PendingReceipt>>,
}

impl DlrCorrelator {
    pub fn new(
        tenant: impl Into<String>,
        repository: SharedRepository,
        retention_days: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            tenant: tenant.into(),
            repository,
            retention: Duration::from_secs(u64::from(retention_days.max(1)) * 24 * 3600),
            entries: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        })
    }

    /// Record `external → internal` after a successful submit.
    ///
    /// If the matching receipt already arrived, it is applied immediately.
    pub async fn store_correlation(&self, internal: MessageId, external: &str) {
        let parked = self.pending.write().await.remove(external);

        if let Some(parked) = parked {
            debug!(
                tenant = %self.tenant,
                external_id = %external,
                "receipt arrived before correlation, applying now"
            );
            self.apply(internal, &parked.dlr).await;
            return;
        }

        self.entries.write().await.insert(
            external.to_string(),
            Correlation {
                message_id: internal,
                created_at: Instant::now(),
            },
        );

        debug!(
            tenant = %self.tenant,
            message_id = %internal,
            external_id = %external,
            "correlation stored"
        );
    }

    /// Process one deliver_sm from the SMSC.
    pub async fn process_receipt(&self, deliver: &DeliverSm) {
        let text = deliver.receipt_text();

        let Some(dlr) = Dlr::parse(&text) else {
            // Not a receipt, likely a mobile-originated message.
            debug!(
                tenant = %self.tenant,
                source = %deliver.source_addr,
                "received non-DLR deliver_sm"
            );
            return;
        };

        counters::dlr_received(&self.tenant, dlr.status.as_str());

        debug!(
            tenant = %self.tenant,
            external_id = %dlr.message_id,
            stat = dlr.status.as_str(),
            "DLR received"
        );

        if !dlr.status.is_final() {
            // ACCEPTD and friends carry no transition; the row stays Sent.
            return;
        }

        let correlation = self.entries.write().await.remove(&dlr.message_id);

        match correlation {
            Some(correlation) => {
                self.apply(correlation.message_id, &dlr).await;
            }
            None => {
                warn!(
                    tenant = %self.tenant,
                    external_id = %dlr.message_id,
                    "DLR for unknown message, parking"
                );
                self.pending.write().await.insert(
                    dlr.message_id.clone(),
                    PendingReceipt {
                        dlr,
                        received_at: Instant::now(),
                    },
                );
            }
        }
    }

    /// Apply a terminal receipt to the repository.
    async fn apply(&self, message_id: MessageId, dlr: &Dlr) {
        let update = if dlr.status.is_success() {
            counters::message_delivered(&self.tenant);
            StatusUpdate::delivered()
        } else {
            counters::message_failed(&self.tenant, "SMPP");
            StatusUpdate::failed(format!(
                "DLR: {} err:{}",
                dlr.status.as_str(),
                dlr.error_code.as_deref().unwrap_or("000")
            ))
        };

        match self.repository.update_status(message_id, update).await {
            Ok(row) => {
                info!(
                    tenant = %self.tenant,
                    message_id = %message_id,
                    external_id = %dlr.message_id,
                    status = %row.status,
                    "delivery receipt applied"
                );
            }
            Err(e) => {
                warn!(
                    tenant = %self.tenant,
                    message_id = %message_id,
                    error = %e,
                    "failed to apply delivery receipt"
                );
            }
        }
    }

    /// Drop correlations older than the retention window and stale parked
    /// receipts. Returns how many correlations were removed.
    pub async fn sweep(&self) -> usize {
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, c| c.created_at.elapsed() < self.retention);
            before - entries.len()
        };

        {
            let mut pending = self.pending.write().await;
            pending.retain(|_, p| p.received_at.elapsed() < PENDING_RECEIPT_TTL);
        }

        if removed > 0 {
            info!(tenant = %self.tenant, removed, "swept stale correlations");
        }
        removed
    }

    /// Number of live correlations.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Spawn the receipt processor: consumes deliver_sm events from the
    /// tenant's sessions and runs the hourly sweep.
    pub fn spawn(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<DeliverSm>,
        mut shutdown_rx: tokio::sync::watch::Receiver<crate::bootstrap::ShutdownState>,
    ) -> JoinHandle<()> {
        let correlator = Arc::clone(self);

        tokio::spawn(async move {
            info!(tenant = %correlator.tenant, "DLR processor started");

            let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
            sweep.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow_and_update() != crate::bootstrap::ShutdownState::Running {
                            info!(tenant = %correlator.tenant, "DLR processor shutting down");
                            break;
                        }
                    }

                    deliver = rx.recv() => {
                        let Some(deliver) = deliver else {
                            info!(tenant = %correlator.tenant, "DLR channel closed");
                            break;
                        };
                        correlator.process_receipt(&deliver).await;
                    }

                    _ = sweep.tick() => {
                        correlator.sweep().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChannelType, InMemoryRepository, MessageRepository, MessageStatus, StoredMessage};

    fn receipt(external: &str, stat: &str) -> DeliverSm {
        DeliverSm {
            sequence_number: 1,
            service_type: String::new(),
            source_addr: "12345".into(),
            dest_addr: "+1999".into(),
            esm_class: 0x04,
            registered_delivery: 0,
            data_coding: 0,
            short_message: format!("id:{external} sub:001 dlvrd:001 stat:{stat} err:000")
                .into_bytes(),
            tlvs: Vec::new(),
        }
    }

    async fn seeded_repo() -> (Arc<InMemoryRepository>, MessageId) {
        let repo = Arc::new(InMemoryRepository::new());
        let msg = StoredMessage::new("telco-key", "+1999", "hi", ChannelType::Smpp);
        let id = msg.id;
        repo.insert(msg).await.unwrap();
        repo.update_status(id, StatusUpdate::sent(Some("ext-1".into())))
            .await
            .unwrap();
        (repo, id)
    }

    #[tokio::test]
    async fn test_delivered_receipt_transitions_row() {
        let (repo, id) = seeded_repo().await;
        let correlator = DlrCorrelator::new("telco-key", repo.clone(), 7);

        correlator.store_correlation(id, "ext-1").await;
        correlator.process_receipt(&receipt("ext-1", "DELIVRD")).await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Delivered);

        // Terminal receipt removes the correlation.
        assert_eq!(correlator.len().await, 0);
    }

    #[tokio::test]
    async fn test_failure_receipt_records_error() {
        let (repo, id) = seeded_repo().await;
        let correlator = DlrCorrelator::new("telco-key", repo.clone(), 7);

        correlator.store_correlation(id, "ext-1").await;
        correlator.process_receipt(&receipt("ext-1", "UNDELIV")).await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Failed);
        assert!(row.error_message.unwrap().contains("UNDELIV"));
    }

    #[tokio::test]
    async fn test_accepted_receipt_is_not_a_transition() {
        let (repo, id) = seeded_repo().await;
        let correlator = DlrCorrelator::new("telco-key", repo.clone(), 7);

        correlator.store_correlation(id, "ext-1").await;
        correlator.process_receipt(&receipt("ext-1", "ACCEPTD")).await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        // Non-terminal receipts keep the correlation alive.
        assert_eq!(correlator.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_receipt_produces_no_update() {
        let (repo, id) = seeded_repo().await;
        let correlator = DlrCorrelator::new("telco-key", repo.clone(), 7);

        correlator.store_correlation(id, "ext-1").await;
        correlator.process_receipt(&receipt("other", "DELIVRD")).await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_receipt_before_correlation_applies_on_store() {
        let (repo, id) = seeded_repo().await;
        let correlator = DlrCorrelator::new("telco-key", repo.clone(), 7);

        // DLR wins the race against the submit path's own bookkeeping.
        correlator.process_receipt(&receipt("ext-1", "DELIVRD")).await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Sent);

        correlator.store_correlation(id, "ext-1").await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Delivered);
        assert_eq!(correlator.len().await, 0);
    }

    #[tokio::test]
    async fn test_non_receipt_deliver_sm_ignored() {
        let (repo, id) = seeded_repo().await;
        let correlator = DlrCorrelator::new("telco-key", repo.clone(), 7);
        correlator.store_correlation(id, "ext-1").await;

        let mo = DeliverSm {
            sequence_number: 2,
            service_type: String::new(),
            source_addr: "+1555".into(),
            dest_addr: "12345".into(),
            esm_class: 0,
            registered_delivery: 0,
            data_coding: 0,
            short_message: b"hello hub".to_vec(),
            tlvs: Vec::new(),
        };
        correlator.process_receipt(&mo).await;

        let row = repo.get_for_tenant(id, "telco-key").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(correlator.len().await, 1);
    }
}
