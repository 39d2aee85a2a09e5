//! In-memory repository implementation.
//!
//! Volatile storage for development and testing. All data is lost on restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::types::*;
use super::{MessageRepository, RepositoryError};

/// In-memory repository.
///
/// Thread-safe via RwLock. Rows are indexed by message id; tenant scoping is
/// applied on every read path.
pub struct InMemoryRepository {
    messages: RwLock<HashMap<MessageId, StoredMessage>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for InMemoryRepository {
    async fn insert(&self, message: StoredMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().unwrap();
        if messages.contains_key(&message.id) {
            return Err(RepositoryError::Duplicate(message.id));
        }

        debug!(
            message_id = %message.id,
            tenant = %message.subscription_key,
            channel = %message.channel_type,
            "message inserted"
        );

        messages.insert(message.id, message);
        Ok(())
    }

    async fn update_status(
        &self,
        id: MessageId,
        update: StatusUpdate,
    ) -> Result<StoredMessage, RepositoryError> {
        let mut messages = self.messages.write().unwrap();
        let msg = messages.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        let mut changed = false;

        if let Some(status) = update.status {
            if msg.status != status {
                msg.status = status;
                changed = true;
            }
        }

        // Immutable once set.
        if msg.external_message_id.is_none() {
            if let Some(external) = update.external_message_id {
                msg.external_message_id = Some(external);
                changed = true;
            }
        }

        if update.error_message.is_some() && msg.error_message != update.error_message {
            msg.error_message = update.error_message;
            changed = true;
        }

        if changed {
            // updated_at is monotone non-decreasing.
            msg.updated_at = Utc::now().max(msg.updated_at);
        }

        Ok(msg.clone())
    }

    async fn increment_retry(&self, id: MessageId) -> Result<u32, RepositoryError> {
        let mut messages = self.messages.write().unwrap();
        let msg = messages.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        msg.retry_count += 1;
        msg.updated_at = Utc::now().max(msg.updated_at);
        Ok(msg.retry_count)
    }

    async fn get_for_tenant(
        &self,
        id: MessageId,
        subscription_key: &str,
    ) -> Result<Option<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().unwrap();
        Ok(messages
            .get(&id)
            .filter(|m| m.subscription_key == subscription_key)
            .cloned())
    }

    async fn list_for_tenant(
        &self,
        subscription_key: &str,
        query: &MessageQuery,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().unwrap();

        let mut rows: Vec<_> = messages
            .values()
            .filter(|m| m.subscription_key == subscription_key)
            .filter(|m| query.status.map(|s| m.status == s).unwrap_or(true))
            .cloned()
            .collect();

        // Newest first, the order the (subscription_key, created_at DESC)
        // index would produce.
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(query.limit.min(MAX_LIST_LIMIT));

        Ok(rows)
    }

    async fn stats(&self) -> RepositoryStats {
        let messages = self.messages.read().unwrap();

        let mut stats = RepositoryStats {
            total: messages.len() as u64,
            ..Default::default()
        };

        for msg in messages.values() {
            match msg.status {
                MessageStatus::Queued => stats.queued += 1,
                MessageStatus::Processing => stats.processing += 1,
                MessageStatus::Sent => stats.sent += 1,
                MessageStatus::Delivered => stats.delivered += 1,
                MessageStatus::Failed => stats.failed += 1,
            }
        }

        stats
    }
}
