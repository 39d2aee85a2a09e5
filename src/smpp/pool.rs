//! Per-tenant pool of bound SMPP clients.
//!
//! Bound sessions are precious: the pool keeps at most `max_connections`
//! alive, pre-warms `min_connections` at construction, and verifies health
//! on every return. A client that no longer reports bound is disposed; the
//! semaphore permit it held frees a slot for a replacement on the next
//! acquire.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::SmppChannelConfig;
use crate::telemetry::counters;

use super::client::SmppClient;
use super::pdu::DeliverSm;
use super::SmppError;

/// Grace period for unbind during shutdown.
const UNBIND_GRACE: Duration = Duration::from_secs(5);

/// Pool acquisition errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no connection available within {0:?}")]
    AcquireTimeout(Duration),

    #[error("pool is shut down")]
    Closed,

    #[error("connect failed: {0}")]
    Connect(#[from] SmppError),
}

struct PoolInner {
    tenant: String,
    config: SmppChannelConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<SmppClient>>,
    connections_created: AtomicUsize,
    dlr_tx: mpsc::Sender<DeliverSm>,
}

/// A client checked out of the pool.
///
/// Dropping returns the client: re-enqueued while it still reports bound,
/// disposed otherwise.
pub struct PooledClient {
    client: Option<SmppClient>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledClient {
    type Target = SmppClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("client taken")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };

        if client.is_bound() {
            let mut idle = self.inner.idle.lock().unwrap();
            if idle.len() < self.inner.config.pool.max_idle {
                idle.push_back(client);
                debug!(tenant = %self.inner.tenant, "connection returned to pool");
                return;
            }
        }

        debug!(tenant = %self.inner.tenant, "disposing returned connection");
        drop(client);
    }
}

/// Connection pool for one tenant's SMSC.
pub struct SmppPool {
    inner: Arc<PoolInner>,
}

impl SmppPool {
    /// Create a pool. Clients created here forward delivery receipts to
    /// `dlr_tx`.
    pub fn new(
        tenant: impl Into<String>,
        config: SmppChannelConfig,
        dlr_tx: mpsc::Sender<DeliverSm>,
    ) -> Self {
        let max = config.pool.max_connections.max(1);

        Self {
            inner: Arc::new(PoolInner {
                tenant: tenant.into(),
                config,
                semaphore: Arc::new(Semaphore::new(max)),
                idle: Mutex::new(VecDeque::new()),
                connections_created: AtomicUsize::new(0),
                dlr_tx,
            }),
        }
    }

    /// Pre-warm the pool with `min_connections` bound clients.
    pub async fn warm(&self) {
        let min = self.inner.config.pool.min_connections;
        if min == 0 {
            return;
        }

        info!(
            tenant = %self.inner.tenant,
            min_connections = min,
            "warming SMPP connection pool"
        );

        for _ in 0..min {
            match self.create_client().await {
                Ok(client) => {
                    self.inner.idle.lock().unwrap().push_back(client);
                }
                Err(e) => {
                    warn!(
                        tenant = %self.inner.tenant,
                        error = %e,
                        "failed to warm pool"
                    );
                    break;
                }
            }
        }
    }

    /// Acquire a bound client, waiting up to `connect_timeout` for a slot.
    pub async fn get(&self) -> Result<PooledClient, PoolError> {
        let timeout = self.inner.config.pool.connect_timeout;

        let permit = match tokio::time::timeout(
            timeout,
            self.inner.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                warn!(tenant = %self.inner.tenant, "connection acquire timeout");
                counters::smpp_pool_timeout(&self.inner.tenant);
                return Err(PoolError::AcquireTimeout(timeout));
            }
        };

        // Reuse an idle bound client; dispose any that went stale.
        loop {
            let candidate = self.inner.idle.lock().unwrap().pop_front();
            match candidate {
                Some(client) if client.is_bound() => {
                    debug!(tenant = %self.inner.tenant, "reusing idle connection");
                    return Ok(PooledClient {
                        client: Some(client),
                        inner: self.inner.clone(),
                        _permit: permit,
                    });
                }
                Some(stale) => {
                    debug!(tenant = %self.inner.tenant, "disposing stale idle connection");
                    drop(stale);
                }
                None => break,
            }
        }

        let client = self.create_client().await?;
        Ok(PooledClient {
            client: Some(client),
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    async fn create_client(&self) -> Result<SmppClient, SmppError> {
        debug!(
            tenant = %self.inner.tenant,
            host = %self.inner.config.host,
            "creating SMPP connection"
        );

        let client = SmppClient::connect(&self.inner.config, self.inner.dlr_tx.clone()).await?;

        let total = self.inner.connections_created.fetch_add(1, Ordering::SeqCst) + 1;
        counters::smpp_connection_created(&self.inner.tenant);

        info!(
            tenant = %self.inner.tenant,
            host = %self.inner.config.host,
            total_created = total,
            "SMPP connection bound"
        );

        Ok(client)
    }

    /// Number of idle clients.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().unwrap().len()
    }

    /// Total connections created over the pool's lifetime.
    pub fn total_created(&self) -> usize {
        self.inner.connections_created.load(Ordering::Relaxed)
    }

    /// Unbind and dispose every idle client, with a bounded grace per unbind.
    pub async fn shutdown(&self) {
        let clients: Vec<SmppClient> = {
            let mut idle = self.inner.idle.lock().unwrap();
            idle.drain(..).collect()
        };

        if clients.is_empty() {
            return;
        }

        info!(
            tenant = %self.inner.tenant,
            connections = clients.len(),
            "unbinding SMPP pool"
        );

        for client in clients {
            if let Err(e) = client.unbind(UNBIND_GRACE).await {
                debug!(tenant = %self.inner.tenant, error = %e, "unbind failed");
            }
        }

        self.inner.semaphore.close();
    }
}
