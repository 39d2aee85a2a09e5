//! Queue transport between submission and delivery.
//!
//! The submission handler publishes a [`MessageQueuedEvent`] per accepted
//! message; the delivery worker consumes them with at-least-once semantics.
//! A delivery must be explicitly acked; nacking re-enqueues the event after
//! the configured redelivery delay. The repository remains the source of
//! truth — consumers must be idempotent.

mod memory;

pub use memory::InProcessQueue;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::config::{QueueBackend, QueueConfig};
use crate::store::{ChannelType, MessageId};

/// Event published when a message is accepted for delivery.
#[derive(Debug, Clone)]
pub struct MessageQueuedEvent {
    pub message_id: MessageId,
    pub subscription_key: String,
    pub content: String,
    pub recipient: String,
    pub channel_type: ChannelType,
    pub created_at: DateTime<Utc>,
}

/// Errors surfaced by the queue transport.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue is full")]
    Full,

    #[error("consumer already taken")]
    ConsumerTaken,
}

/// A delivery handed to the consumer.
///
/// Dropping without ack or nack discards the delivery; the worker always
/// resolves one of the two before returning.
#[derive(Debug)]
pub struct QueueDelivery {
    pub event: MessageQueuedEvent,
    /// 1-based delivery attempt
    pub attempt: u32,
    redeliver_tx: mpsc::Sender<Envelope>,
    redelivery_delay: std::time::Duration,
}

impl QueueDelivery {
    /// Acknowledge successful processing.
    pub fn ack(self) {}

    /// Reject and schedule redelivery after the transport's delay.
    pub fn nack(self) {
        let envelope = Envelope {
            event: self.event,
            attempt: self.attempt + 1,
        };
        let tx = self.redeliver_tx.clone();
        let delay = self.redelivery_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(envelope).await.is_err() {
                tracing::warn!("queue closed, dropping redelivery");
            }
        });
    }
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub event: MessageQueuedEvent,
    pub attempt: u32,
}

/// Consumer side of the transport. One consumer group per hub process.
pub struct QueueConsumer {
    pub(crate) rx: mpsc::Receiver<Envelope>,
    pub(crate) redeliver_tx: mpsc::Sender<Envelope>,
    pub(crate) redelivery_delay: std::time::Duration,
}

impl QueueConsumer {
    /// Receive the next delivery. Returns `None` once the transport closes.
    pub async fn recv(&mut self) -> Option<QueueDelivery> {
        let envelope = self.rx.recv().await?;
        Some(QueueDelivery {
            event: envelope.event,
            attempt: envelope.attempt,
            redeliver_tx: self.redeliver_tx.clone(),
            redelivery_delay: self.redelivery_delay,
        })
    }
}

/// Queue transport seam.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Publish a queued event.
    async fn publish(&self, event: MessageQueuedEvent) -> Result<(), QueueError>;

    /// Take the consumer. May be called once per transport.
    fn take_consumer(&self) -> Result<QueueConsumer, QueueError>;
}

/// Shared queue handle.
pub type SharedQueue = Arc<dyn QueueTransport>;

/// Create a queue transport based on configuration.
pub fn create_queue(config: &QueueConfig) -> anyhow::Result<SharedQueue> {
    match config.backend {
        QueueBackend::InProcess => {
            tracing::info!(
                capacity = config.capacity,
                redelivery_delay_ms = config.redelivery_delay.as_millis() as u64,
                "using in-process queue transport"
            );
            Ok(Arc::new(InProcessQueue::new(
                config.capacity,
                config.redelivery_delay,
            )))
        }
    }
}
