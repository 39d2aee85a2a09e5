//! Delivery worker: consumes queued events and drives the message state
//! machine.
//!
//! For each delivery: mark `Processing`, route to the channel, then either
//! mark `Sent` (with the external id), let the queue redeliver (transient
//! failure under the retry budget), or mark `Failed`. Every path leaves the
//! row out of `Processing` before the delivery resolves, so redelivery is
//! always observable in the repository.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::bootstrap::{ShutdownManager, ShutdownState, TenantRegistry};
use crate::channel::ChannelRouter;
use crate::queue::{QueueConsumer, QueueDelivery};
use crate::store::{MessageStatus, SharedRepository, StatusUpdate};
use crate::telemetry::counters;

/// Drives deliveries from the queue consumer.
pub struct DeliveryWorker {
    repository: SharedRepository,
    router: Arc<ChannelRouter>,
    tenants: Arc<TenantRegistry>,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<ShutdownManager>,
}

impl DeliveryWorker {
    pub fn new(
        repository: SharedRepository,
        router: Arc<ChannelRouter>,
        tenants: Arc<TenantRegistry>,
        concurrency: usize,
        shutdown: Arc<ShutdownManager>,
    ) -> Self {
        Self {
            repository,
            router,
            tenants,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            shutdown,
        }
    }

    /// Consume until shutdown. Each delivery runs as its own task under the
    /// concurrency limit.
    pub async fn run(self, mut consumer: QueueConsumer) {
        info!(
            concurrency = self.semaphore.available_permits(),
            "delivery worker started"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow_and_update() != ShutdownState::Running {
                        info!("delivery worker shutting down");
                        break;
                    }
                }

                delivery = consumer.recv() => {
                    let Some(delivery) = delivery else {
                        info!("queue consumer closed");
                        break;
                    };

                    let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                        break;
                    };

                    let repository = self.repository.clone();
                    let router = self.router.clone();
                    let tenants = self.tenants.clone();
                    let shutdown = self.shutdown.clone();

                    tokio::spawn(async move {
                        let _permit = permit;

                        if !shutdown.delivery_started() {
                            // Draining; hand the event back for the next run.
                            delivery.nack();
                            return;
                        }

                        process_delivery(repository, router, tenants, delivery).await;
                        shutdown.delivery_finished();
                    });
                }
            }
        }
    }
}

async fn process_delivery(
    repository: SharedRepository,
    router: Arc<ChannelRouter>,
    tenants: Arc<TenantRegistry>,
    delivery: QueueDelivery,
) {
    let event = &delivery.event;
    let message_id = event.message_id;

    debug!(
        message_id = %message_id,
        tenant = %event.subscription_key,
        channel = %event.channel_type,
        attempt = delivery.attempt,
        "processing delivery"
    );

    // At-least-once transport: a redelivered event whose row already moved
    // past Processing must not produce a second send.
    match repository
        .get_for_tenant(message_id, &event.subscription_key)
        .await
    {
        Ok(Some(row)) => {
            if !matches!(row.status, MessageStatus::Queued | MessageStatus::Processing) {
                debug!(
                    message_id = %message_id,
                    status = %row.status,
                    "message already resolved, dropping redelivery"
                );
                delivery.ack();
                return;
            }
        }
        Ok(None) => {
            // Row missing (e.g. volatile store restarted); nothing to deliver.
            warn!(message_id = %message_id, "unknown message, dropping");
            delivery.ack();
            return;
        }
        Err(e) => {
            warn!(message_id = %message_id, error = %e, "repository read failed, redelivering");
            delivery.nack();
            return;
        }
    }

    if let Err(e) = repository
        .update_status(message_id, StatusUpdate::status(MessageStatus::Processing))
        .await
    {
        warn!(message_id = %message_id, error = %e, "cannot mark processing, dropping");
        delivery.ack();
        return;
    }

    let channel = router.route(event.channel_type);
    let result = channel.send(event).await;

    if result.ok {
        match repository
            .update_status(message_id, StatusUpdate::sent(result.external_id.clone()))
            .await
        {
            Ok(_) => {
                info!(
                    message_id = %message_id,
                    tenant = %event.subscription_key,
                    external_id = result.external_id.as_deref().unwrap_or("-"),
                    "message sent"
                );
            }
            Err(e) => {
                error!(message_id = %message_id, error = %e, "failed to mark sent");
            }
        }
        delivery.ack();
        return;
    }

    let reason = result
        .error
        .unwrap_or_else(|| "channel send failed".to_string());

    let max_retries = tenants
        .get(&event.subscription_key)
        .map(|t| t.max_retries(event.channel_type))
        .unwrap_or(0);

    // attempt is 1-based: attempt n has had n-1 retries already.
    if result.transient && delivery.attempt <= max_retries {
        let retry_count = match repository.increment_retry(message_id).await {
            Ok(count) => count,
            Err(e) => {
                error!(message_id = %message_id, error = %e, "failed to increment retry count");
                0
            }
        };

        warn!(
            message_id = %message_id,
            tenant = %event.subscription_key,
            retry_count,
            max_retries,
            reason = %reason,
            "transient failure, redelivering"
        );

        counters::delivery_retried(&event.subscription_key);
        delivery.nack();
        return;
    }

    match repository
        .update_status(message_id, StatusUpdate::failed(reason.clone()))
        .await
    {
        Ok(_) => {
            warn!(
                message_id = %message_id,
                tenant = %event.subscription_key,
                transient = result.transient,
                reason = %reason,
                "message failed"
            );
            counters::message_failed(&event.subscription_key, event.channel_type.as_str());
        }
        Err(e) => {
            error!(message_id = %message_id, error = %e, "failed to mark failed");
        }
    }

    delivery.ack();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::ScriptedChannel;
    use crate::channel::ChannelResult;
    use crate::config::Config;
    use crate::queue::{InProcessQueue, MessageQueuedEvent, QueueTransport};
    use crate::store::{ChannelType, InMemoryRepository, MessageRepository, StoredMessage};
    use std::time::Duration;

    fn registry(max_retries: u32) -> Arc<TenantRegistry> {
        let yaml = format!(
            r#"
tenants:
  demo-key:
    name: Demo
    http:
      endpoint: "https://sms.example.com/send"
      api_key: secret
      max_retries: {max_retries}
"#
        );
        Arc::new(TenantRegistry::new(&Config::from_yaml(&yaml).unwrap()))
    }

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        queue: Arc<InProcessQueue>,
        shutdown: Arc<ShutdownManager>,
    }

    async fn run_worker(
        http_channel: Arc<ScriptedChannel>,
        max_retries: u32,
    ) -> (Fixture, crate::store::MessageId) {
        let repo = Arc::new(InMemoryRepository::new());
        let queue = Arc::new(InProcessQueue::new(64, Duration::from_millis(10)));
        let shutdown = ShutdownManager::new(Duration::from_secs(5));

        let smpp_stub = ScriptedChannel::new(vec![ChannelResult::permanent("unused")]);
        let router = Arc::new(ChannelRouter::new(http_channel, smpp_stub));

        let msg = StoredMessage::new("demo-key", "+1999", "hello", ChannelType::Http);
        let id = msg.id;
        let created_at = msg.created_at;
        repo.insert(msg).await.unwrap();

        queue
            .publish(MessageQueuedEvent {
                message_id: id,
                subscription_key: "demo-key".into(),
                content: "hello".into(),
                recipient: "+1999".into(),
                channel_type: ChannelType::Http,
                created_at,
            })
            .await
            .unwrap();

        let worker = DeliveryWorker::new(
            repo.clone(),
            router,
            registry(max_retries),
            4,
            shutdown.clone(),
        );
        let consumer = queue.take_consumer().unwrap();
        tokio::spawn(worker.run(consumer));

        (
            Fixture {
                repo,
                queue,
                shutdown,
            },
            id,
        )
    }

    async fn wait_for_status(
        repo: &Arc<InMemoryRepository>,
        id: crate::store::MessageId,
        status: MessageStatus,
    ) -> StoredMessage {
        for _ in 0..100 {
            let row = repo.get_for_tenant(id, "demo-key").await.unwrap().unwrap();
            if row.status == status {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("message never reached {status}");
    }

    #[tokio::test]
    async fn test_success_marks_sent_with_external_id() {
        let channel = ScriptedChannel::new(vec![ChannelResult::success(Some("ext-42".into()))]);
        let (fixture, id) = run_worker(channel.clone(), 3).await;

        let row = wait_for_status(&fixture.repo, id, MessageStatus::Sent).await;
        assert_eq!(row.external_message_id.as_deref(), Some("ext-42"));
        assert_eq!(channel.calls(), 1);

        fixture.shutdown.start_drain();
        drop(fixture.queue);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let channel = ScriptedChannel::new(vec![
            ChannelResult::transient("connect timeout"),
            ChannelResult::success(Some("ext-7".into())),
        ]);
        let (fixture, id) = run_worker(channel.clone(), 3).await;

        let row = wait_for_status(&fixture.repo, id, MessageStatus::Sent).await;
        assert_eq!(row.retry_count, 1);
        assert_eq!(channel.calls(), 2);

        fixture.shutdown.start_drain();
    }

    #[tokio::test]
    async fn test_permanent_failure_fails_immediately() {
        let channel = ScriptedChannel::new(vec![ChannelResult::permanent("HTTP 400: bad number")]);
        let (fixture, id) = run_worker(channel.clone(), 3).await;

        let row = wait_for_status(&fixture.repo, id, MessageStatus::Failed).await;
        assert_eq!(row.error_message.as_deref(), Some("HTTP 400: bad number"));
        assert_eq!(row.retry_count, 0);
        assert_eq!(channel.calls(), 1);

        fixture.shutdown.start_drain();
    }

    #[tokio::test]
    async fn test_redelivered_event_for_sent_row_is_dropped() {
        let channel = ScriptedChannel::new(vec![ChannelResult::success(Some("ext-1".into()))]);
        let (fixture, id) = run_worker(channel.clone(), 3).await;

        wait_for_status(&fixture.repo, id, MessageStatus::Sent).await;
        assert_eq!(channel.calls(), 1);

        // A broker duplicate of the same event must not send twice.
        fixture
            .queue
            .publish(MessageQueuedEvent {
                message_id: id,
                subscription_key: "demo-key".into(),
                content: "hello".into(),
                recipient: "+1999".into(),
                channel_type: ChannelType::Http,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let row = fixture
            .repo
            .get_for_tenant(id, "demo-key")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(channel.calls(), 1);

        fixture.shutdown.start_drain();
    }

    #[tokio::test]
    async fn test_transient_exhaustion_fails() {
        let channel = ScriptedChannel::new(vec![ChannelResult::transient("always down")]);
        let (fixture, id) = run_worker(channel.clone(), 1).await;

        let row = wait_for_status(&fixture.repo, id, MessageStatus::Failed).await;
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.error_message.as_deref(), Some("always down"));
        // attempt 1 retried, attempt 2 exhausted the budget.
        assert_eq!(channel.calls(), 2);

        fixture.shutdown.start_drain();
    }
}
