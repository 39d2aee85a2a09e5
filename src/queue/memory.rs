//! In-process queue transport.
//!
//! A bounded mpsc channel standing in for a durable broker in local and
//! single-node deployments. Redelivery on nack is the broker behavior the
//! delivery worker relies on; ordering is best-effort.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Envelope, MessageQueuedEvent, QueueConsumer, QueueError, QueueTransport};

pub struct InProcessQueue {
    tx: mpsc::Sender<Envelope>,
    consumer: Mutex<Option<QueueConsumer>>,
}

impl InProcessQueue {
    pub fn new(capacity: usize, redelivery_delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity);

        let consumer = QueueConsumer {
            rx,
            redeliver_tx: tx.clone(),
            redelivery_delay,
        };

        Self {
            tx,
            consumer: Mutex::new(Some(consumer)),
        }
    }
}

#[async_trait]
impl QueueTransport for InProcessQueue {
    async fn publish(&self, event: MessageQueuedEvent) -> Result<(), QueueError> {
        debug!(
            message_id = %event.message_id,
            tenant = %event.subscription_key,
            channel = %event.channel_type,
            "publishing queued event"
        );

        self.tx
            .try_send(Envelope { event, attempt: 1 })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })
    }

    fn take_consumer(&self) -> Result<QueueConsumer, QueueError> {
        self.consumer
            .lock()
            .unwrap()
            .take()
            .ok_or(QueueError::ConsumerTaken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChannelType, MessageId};
    use chrono::Utc;

    fn event() -> MessageQueuedEvent {
        MessageQueuedEvent {
            message_id: MessageId::new(),
            subscription_key: "demo-key".into(),
            content: "hello".into(),
            recipient: "+1234567890".into(),
            channel_type: ChannelType::Http,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_consume() {
        let queue = InProcessQueue::new(16, Duration::from_millis(10));
        let mut consumer = queue.take_consumer().unwrap();

        let evt = event();
        let id = evt.message_id;
        queue.publish(evt).await.unwrap();

        let delivery = consumer.recv().await.unwrap();
        assert_eq!(delivery.event.message_id, id);
        assert_eq!(delivery.attempt, 1);
        delivery.ack();
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_incremented_attempt() {
        let queue = InProcessQueue::new(16, Duration::from_millis(10));
        let mut consumer = queue.take_consumer().unwrap();

        queue.publish(event()).await.unwrap();

        let delivery = consumer.recv().await.unwrap();
        assert_eq!(delivery.attempt, 1);
        delivery.nack();

        let redelivered = tokio::time::timeout(Duration::from_secs(1), consumer.recv())
            .await
            .expect("redelivery timed out")
            .unwrap();
        assert_eq!(redelivered.attempt, 2);
    }

    #[tokio::test]
    async fn test_consumer_taken_once() {
        let queue = InProcessQueue::new(16, Duration::from_millis(10));
        let _consumer = queue.take_consumer().unwrap();
        assert!(matches!(
            queue.take_consumer(),
            Err(QueueError::ConsumerTaken)
        ));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_publish() {
        let queue = InProcessQueue::new(1, Duration::from_millis(10));
        let _consumer = queue.take_consumer().unwrap();

        queue.publish(event()).await.unwrap();
        assert!(matches!(
            queue.publish(event()).await,
            Err(QueueError::Full)
        ));
    }
}
