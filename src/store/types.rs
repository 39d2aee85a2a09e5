//! Types for the message repository.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique message identifier, generated at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Create a new unique message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Outbound delivery channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "HTTP", alias = "http", alias = "Http")]
    Http,
    #[serde(rename = "SMPP", alias = "smpp", alias = "Smpp")]
    Smpp,
}

impl ChannelType {
    /// Parse a channel type case-insensitively. Unknown names are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HTTP" => Some(Self::Http),
            "SMPP" => Some(Self::Smpp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Smpp => "SMPP",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message delivery status.
///
/// Transitions form a DAG: `Queued → Processing → {Sent, Failed}` and
/// `Sent → {Delivered, Failed}`. `Delivered` and `Failed` are terminal.
/// The repository does not enforce the DAG; the delivery worker and the DLR
/// correlator are the only writers and each targets a specific transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    Queued,
    Processing,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    /// Check if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Processing => "Processing",
            Self::Sent => "Sent",
            Self::Delivered => "Delivered",
            Self::Failed => "Failed",
        }
    }

    /// Parse a status filter value case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored message row.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Owning tenant subscription key
    pub subscription_key: String,
    /// Message text
    pub content: String,
    /// Destination address
    pub recipient: String,
    /// Delivery channel
    pub channel_type: ChannelType,
    /// Current status
    pub status: MessageStatus,
    /// When the message was submitted
    pub created_at: DateTime<Utc>,
    /// When the message was last updated
    pub updated_at: DateTime<Utc>,
    /// Identifier assigned by the remote provider at the first `Sent` transition
    pub external_message_id: Option<String>,
    /// Error message from the last failure
    pub error_message: Option<String>,
    /// Transient-failure retry count
    pub retry_count: u32,
}

impl StoredMessage {
    /// Create a new queued message.
    pub fn new(
        subscription_key: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
        channel_type: ChannelType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            subscription_key: subscription_key.into(),
            content: content.into(),
            recipient: recipient.into(),
            channel_type,
            status: MessageStatus::Queued,
            created_at: now,
            updated_at: now,
            external_message_id: None,
            error_message: None,
            retry_count: 0,
        }
    }
}

/// A status transition to apply to a row.
///
/// `external_message_id` is only honored at the first transition into `Sent`;
/// once set it is immutable. Re-applying an identical
/// `(status, external_message_id)` pair yields the same observable state,
/// which keeps the delivery worker idempotent under queue redelivery.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<MessageStatus>,
    pub external_message_id: Option<String>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn sent(external_message_id: Option<String>) -> Self {
        Self {
            status: Some(MessageStatus::Sent),
            external_message_id,
            error_message: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(MessageStatus::Failed),
            external_message_id: None,
            error_message: Some(error.into()),
        }
    }

    pub fn delivered() -> Self {
        Self {
            status: Some(MessageStatus::Delivered),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

/// Maximum rows a tenant-scoped list query may return.
pub const MAX_LIST_LIMIT: usize = 100;

/// Query filter for tenant-scoped message listing.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    /// Filter by status
    pub status: Option<MessageStatus>,
    /// Maximum number of results, capped at [`MAX_LIST_LIMIT`]
    pub limit: usize,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: MAX_LIST_LIMIT,
        }
    }
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIST_LIMIT);
        self
    }
}

/// Repository statistics.
#[derive(Debug, Clone, Default)]
pub struct RepositoryStats {
    pub total: u64,
    pub queued: u64,
    pub processing: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_parse_case_insensitive() {
        assert_eq!(ChannelType::parse("HTTP"), Some(ChannelType::Http));
        assert_eq!(ChannelType::parse("http"), Some(ChannelType::Http));
        assert_eq!(ChannelType::parse("Smpp"), Some(ChannelType::Smpp));
        assert_eq!(ChannelType::parse("smtp"), None);
        assert_eq!(ChannelType::parse(""), None);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!MessageStatus::Queued.is_terminal());
        assert!(!MessageStatus::Processing.is_terminal());
        assert!(!MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::Delivered.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serialized_names() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Queued).unwrap(),
            "\"Queued\""
        );
        assert_eq!(
            MessageStatus::parse("delivered"),
            Some(MessageStatus::Delivered)
        );
        assert_eq!(MessageStatus::parse("bogus"), None);
    }

    #[test]
    fn test_new_message_defaults() {
        let msg = StoredMessage::new("demo-key", "+1234567890", "hi", ChannelType::Http);
        assert_eq!(msg.status, MessageStatus::Queued);
        assert_eq!(msg.retry_count, 0);
        assert!(msg.external_message_id.is_none());
        assert_eq!(msg.created_at, msg.updated_at);
    }

    #[test]
    fn test_query_limit_capped() {
        let query = MessageQuery::new().with_limit(5000);
        assert_eq!(query.limit, MAX_LIST_LIMIT);
    }
}
