//! Outbound delivery channels.
//!
//! A channel takes a queued event and attempts delivery downstream. Results
//! carry a `transient` flag so the delivery worker can decide between queue
//! redelivery and a permanent `Failed` transition.

pub mod http;
pub mod smpp;

pub use http::HttpChannel;
pub use smpp::SmppChannel;

use std::sync::Arc;

use async_trait::async_trait;

use crate::queue::MessageQueuedEvent;
use crate::store::ChannelType;

/// Result of a channel send.
#[derive(Debug, Clone)]
pub struct ChannelResult {
    pub ok: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub transient: bool,
}

impl ChannelResult {
    pub fn success(external_id: Option<String>) -> Self {
        Self {
            ok: true,
            external_id,
            error: None,
            transient: false,
        }
    }

    pub fn transient(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            external_id: None,
            error: Some(error.into()),
            transient: true,
        }
    }

    pub fn permanent(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            external_id: None,
            error: Some(error.into()),
            transient: false,
        }
    }
}

/// An outbound delivery mechanism.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, event: &MessageQueuedEvent) -> ChannelResult;
}

/// Dispatch to the channel implementation by channel type.
///
/// Unknown channel names are rejected at submission time, so the router only
/// sees the two configured kinds.
pub struct ChannelRouter {
    http: Arc<dyn MessageChannel>,
    smpp: Arc<dyn MessageChannel>,
}

impl ChannelRouter {
    pub fn new(http: Arc<dyn MessageChannel>, smpp: Arc<dyn MessageChannel>) -> Self {
        Self { http, smpp }
    }

    pub fn route(&self, channel_type: ChannelType) -> &Arc<dyn MessageChannel> {
        match channel_type {
            ChannelType::Http => &self.http,
            ChannelType::Smpp => &self.smpp,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel stub that returns a scripted sequence of results.
    pub struct ScriptedChannel {
        results: Vec<ChannelResult>,
        calls: AtomicUsize,
    }

    impl ScriptedChannel {
        pub fn new(results: Vec<ChannelResult>) -> Arc<Self> {
            Arc::new(Self {
                results,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageChannel for ScriptedChannel {
        async fn send(&self, _event: &MessageQueuedEvent) -> ChannelResult {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .get(idx.min(self.results.len().saturating_sub(1)))
                .cloned()
                .unwrap_or_else(|| ChannelResult::permanent("no scripted result"))
        }
    }
}
