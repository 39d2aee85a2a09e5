//! Message repository for the delivery pipeline.
//!
//! Persists messages and their status transitions. All reads are scoped by
//! tenant subscription key; a row is never visible to a query bound to a
//! different tenant. Writes are idempotent for identical
//! `(id, status, external_message_id)` so the delivery worker can safely
//! re-apply a transition after queue redelivery.
//!
//! # Implementations
//!
//! - [`InMemoryRepository`]: development, testing and single-node deployments
//! - SQL-backed variants plug in behind [`MessageRepository`]; the core is
//!   dialect-agnostic

mod memory;
mod types;

pub use memory::InMemoryRepository;
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};

/// Errors surfaced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("message not found")]
    NotFound,

    #[error("duplicate message id: {0}")]
    Duplicate(MessageId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Narrow persistence capability set consumed by the core.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a new message row.
    async fn insert(&self, message: StoredMessage) -> Result<(), RepositoryError>;

    /// Apply a status transition by primary key.
    ///
    /// `external_message_id` is only written on the first transition into
    /// `Sent`; later values are ignored. Returns the updated row.
    async fn update_status(
        &self,
        id: MessageId,
        update: StatusUpdate,
    ) -> Result<StoredMessage, RepositoryError>;

    /// Increment the transient-failure retry counter. Returns the new count.
    async fn increment_retry(&self, id: MessageId) -> Result<u32, RepositoryError>;

    /// Fetch a message by id, scoped to the owning tenant.
    async fn get_for_tenant(
        &self,
        id: MessageId,
        subscription_key: &str,
    ) -> Result<Option<StoredMessage>, RepositoryError>;

    /// List a tenant's messages, newest first.
    async fn list_for_tenant(
        &self,
        subscription_key: &str,
        query: &MessageQuery,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    /// Repository statistics.
    async fn stats(&self) -> RepositoryStats;
}

/// Shared repository handle.
pub type SharedRepository = Arc<dyn MessageRepository>;

/// Create a repository backend based on configuration.
pub fn create_repository(config: &StoreConfig) -> anyhow::Result<SharedRepository> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory message repository (volatile)");
            Ok(Arc::new(InMemoryRepository::new()))
        }
    }
}
