//! Shared hub state, constructed once at startup and passed explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, TenantConfig};
use crate::queue::SharedQueue;
use crate::store::SharedRepository;
use crate::submit::SubmissionHandler;

/// Read-only tenant lookup by subscription key.
pub struct TenantRegistry {
    tenants: HashMap<String, Arc<TenantConfig>>,
}

impl TenantRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            tenants: config
                .tenants
                .iter()
                .map(|(key, tenant)| (key.clone(), Arc::new(tenant.clone())))
                .collect(),
        }
    }

    /// Look up a tenant by subscription key.
    pub fn get(&self, subscription_key: &str) -> Option<Arc<TenantConfig>> {
        self.tenants.get(subscription_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

/// Process-lifetime services shared by the API and the delivery pipeline.
pub struct HubState {
    pub config: Arc<Config>,
    pub tenants: Arc<TenantRegistry>,
    pub repository: SharedRepository,
    pub queue: SharedQueue,
    pub submission: Arc<SubmissionHandler>,
    pub started_at: Instant,
}

impl HubState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Shared hub state handle.
pub type SharedHubState = Arc<HubState>;
