//! Message submission: validate, persist, publish.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bootstrap::TenantRegistry;
use crate::queue::{MessageQueuedEvent, SharedQueue};
use crate::store::{ChannelType, MessageId, SharedRepository, StatusUpdate, StoredMessage};
use crate::telemetry::counters;

/// Recipient length bounds.
pub const RECIPIENT_MIN: usize = 1;
pub const RECIPIENT_MAX: usize = 100;

/// Message length bounds.
pub const MESSAGE_MIN: usize = 1;
pub const MESSAGE_MAX: usize = 1600;

/// Maximum messages per batch request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Error recorded on the row when the queue publish fails after insert.
const PUBLISH_FAILURE_REASON: &str = "Failed to queue message for processing";

/// Validation and submission errors. Validation failures are rejected before
/// anything is persisted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("recipient must be {RECIPIENT_MIN}-{RECIPIENT_MAX} characters")]
    InvalidRecipient,

    #[error("message must be {MESSAGE_MIN}-{MESSAGE_MAX} characters")]
    InvalidMessage,

    #[error("unknown channel type: {0}")]
    UnknownChannel(String),

    #[error("channel {0} is not configured for this tenant")]
    ChannelUnavailable(ChannelType),

    #[error("batch exceeds maximum size of {MAX_BATCH_SIZE}")]
    BatchTooLarge,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SubmitError {
    /// Validation errors map to HTTP 400; internal errors to 500.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// One message in a submission request.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub recipient: String,
    pub message: String,
    pub channel_type: String,
}

/// Receipt for an accepted submission.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub message_id: MessageId,
}

/// Per-item result of a batch submission.
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    pub message_id: Option<MessageId>,
    pub recipient: String,
    pub error: Option<String>,
}

/// Batch submission summary.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub items: Vec<BatchItemResult>,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Validates, persists and publishes submissions.
pub struct SubmissionHandler {
    repository: SharedRepository,
    queue: SharedQueue,
    tenants: Arc<TenantRegistry>,
}

impl SubmissionHandler {
    pub fn new(
        repository: SharedRepository,
        queue: SharedQueue,
        tenants: Arc<TenantRegistry>,
    ) -> Self {
        Self {
            repository,
            queue,
            tenants,
        }
    }

    /// Submit a single message for an authenticated tenant.
    pub async fn submit(
        &self,
        subscription_key: &str,
        request: &SubmitRequest,
    ) -> Result<SubmitReceipt, SubmitError> {
        let channel_type = self.validate(subscription_key, request)?;

        let message = StoredMessage::new(
            subscription_key,
            request.recipient.trim(),
            request.message.as_str(),
            channel_type,
        );
        let message_id = message.id;
        let created_at = message.created_at;

        self.repository
            .insert(message)
            .await
            .map_err(|e| SubmitError::Internal(e.to_string()))?;

        let event = MessageQueuedEvent {
            message_id,
            subscription_key: subscription_key.to_string(),
            content: request.message.clone(),
            recipient: request.recipient.trim().to_string(),
            channel_type,
            created_at,
        };

        if let Err(e) = self.queue.publish(event).await {
            error!(
                message_id = %message_id,
                tenant = %subscription_key,
                error = %e,
                "queue publish failed, failing message"
            );

            // The row exists; make its state reflect reality before erroring.
            if let Err(update_err) = self
                .repository
                .update_status(message_id, StatusUpdate::failed(PUBLISH_FAILURE_REASON))
                .await
            {
                warn!(
                    message_id = %message_id,
                    error = %update_err,
                    "failed to mark unpublished message as failed"
                );
            }

            return Err(SubmitError::Internal(PUBLISH_FAILURE_REASON.to_string()));
        }

        counters::message_submitted(subscription_key, channel_type.as_str());

        info!(
            message_id = %message_id,
            tenant = %subscription_key,
            channel = %channel_type,
            "message queued"
        );

        Ok(SubmitReceipt { message_id })
    }

    /// Submit a batch, continuing past individual failures.
    pub async fn submit_batch(
        &self,
        subscription_key: &str,
        requests: &[SubmitRequest],
    ) -> Result<BatchResult, SubmitError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(SubmitError::BatchTooLarge);
        }

        let mut items = Vec::with_capacity(requests.len());
        let mut success = 0usize;

        for request in requests {
            match self.submit(subscription_key, request).await {
                Ok(receipt) => {
                    success += 1;
                    items.push(BatchItemResult {
                        message_id: Some(receipt.message_id),
                        recipient: request.recipient.clone(),
                        error: None,
                    });
                }
                Err(e) => {
                    items.push(BatchItemResult {
                        message_id: None,
                        recipient: request.recipient.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let total = items.len();
        Ok(BatchResult {
            total,
            success,
            failed: total - success,
            items,
        })
    }

    fn validate(
        &self,
        subscription_key: &str,
        request: &SubmitRequest,
    ) -> Result<ChannelType, SubmitError> {
        let recipient = request.recipient.trim();
        if recipient.len() < RECIPIENT_MIN || recipient.len() > RECIPIENT_MAX {
            return Err(SubmitError::InvalidRecipient);
        }

        if request.message.len() < MESSAGE_MIN || request.message.len() > MESSAGE_MAX {
            return Err(SubmitError::InvalidMessage);
        }

        let channel_type = ChannelType::parse(&request.channel_type)
            .ok_or_else(|| SubmitError::UnknownChannel(request.channel_type.clone()))?;

        // The API layer authenticated the key; this re-check guards direct
        // callers of the handler.
        let tenant = self
            .tenants
            .get(subscription_key)
            .ok_or_else(|| SubmitError::Internal("unknown tenant".into()))?;

        if !tenant.has_channel(channel_type) {
            return Err(SubmitError::ChannelUnavailable(channel_type));
        }

        Ok(channel_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::queue::{InProcessQueue, QueueTransport};
    use crate::store::{InMemoryRepository, MessageQuery, MessageRepository, MessageStatus};
    use std::time::Duration;

    fn registry() -> Arc<TenantRegistry> {
        let config = Config::from_yaml(
            r#"
tenants:
  demo-key:
    name: Demo
    http:
      endpoint: "https://sms.example.com/send"
      api_key: secret
"#,
        )
        .unwrap();
        Arc::new(TenantRegistry::new(&config))
    }

    fn handler() -> (SubmissionHandler, Arc<InMemoryRepository>, Arc<InProcessQueue>) {
        let repo = Arc::new(InMemoryRepository::new());
        let queue = Arc::new(InProcessQueue::new(64, Duration::from_millis(10)));
        let handler = SubmissionHandler::new(repo.clone(), queue.clone(), registry());
        (handler, repo, queue)
    }

    fn request(channel: &str) -> SubmitRequest {
        SubmitRequest {
            recipient: "+1234567890".into(),
            message: "hi".into(),
            channel_type: channel.into(),
        }
    }

    #[tokio::test]
    async fn test_submit_persists_and_publishes() {
        let (handler, repo, queue) = handler();
        let mut consumer = queue.take_consumer().unwrap();

        let receipt = handler.submit("demo-key", &request("HTTP")).await.unwrap();

        let row = repo
            .get_for_tenant(receipt.message_id, "demo-key")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, MessageStatus::Queued);

        let delivery = consumer.recv().await.unwrap();
        assert_eq!(delivery.event.message_id, receipt.message_id);
        assert_eq!(delivery.event.channel_type, ChannelType::Http);
    }

    #[tokio::test]
    async fn test_submit_rejects_unconfigured_channel() {
        let (handler, repo, _queue) = handler();

        let err = handler
            .submit("demo-key", &request("SMPP"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::ChannelUnavailable(_)));
        assert!(err.is_validation());

        // Nothing persisted for validation failures.
        let rows = repo
            .list_for_tenant("demo-key", &MessageQuery::new())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_submit_validates_lengths() {
        let (handler, _repo, _queue) = handler();

        let mut bad = request("HTTP");
        bad.recipient = String::new();
        assert!(matches!(
            handler.submit("demo-key", &bad).await,
            Err(SubmitError::InvalidRecipient)
        ));

        let mut bad = request("HTTP");
        bad.message = "x".repeat(1601);
        assert!(matches!(
            handler.submit("demo-key", &bad).await,
            Err(SubmitError::InvalidMessage)
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_channel_name() {
        let (handler, _repo, _queue) = handler();
        assert!(matches!(
            handler.submit("demo-key", &request("carrier-pigeon")).await,
            Err(SubmitError::UnknownChannel(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_marks_row_failed() {
        let repo = Arc::new(InMemoryRepository::new());
        // Capacity 1 with no consumer: the second publish fails.
        let queue = Arc::new(InProcessQueue::new(1, Duration::from_millis(10)));
        let handler = SubmissionHandler::new(repo.clone(), queue, registry());

        handler.submit("demo-key", &request("HTTP")).await.unwrap();
        let err = handler
            .submit("demo-key", &request("HTTP"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Internal(_)));

        let failed = repo
            .list_for_tenant(
                "demo-key",
                &MessageQuery::new().with_status(MessageStatus::Failed),
            )
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].error_message.as_deref(),
            Some("Failed to queue message for processing")
        );
    }

    #[tokio::test]
    async fn test_batch_partial_failure() {
        let (handler, _repo, _queue) = handler();

        let requests = vec![request("HTTP"), request("SMPP"), request("http")];
        let result = handler.submit_batch("demo-key", &requests).await.unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.success, 2);
        assert_eq!(result.failed, 1);

        assert!(result.items[0].message_id.is_some());
        assert!(result.items[1].message_id.is_none());
        assert!(result.items[1]
            .error
            .as_deref()
            .unwrap()
            .contains("not configured"));
        assert!(result.items[2].message_id.is_some());
    }

    #[tokio::test]
    async fn test_batch_size_cap() {
        let (handler, _repo, _queue) = handler();
        let requests = vec![request("HTTP"); MAX_BATCH_SIZE + 1];
        assert!(matches!(
            handler.submit_batch("demo-key", &requests).await,
            Err(SubmitError::BatchTooLarge)
        ));
    }
}
