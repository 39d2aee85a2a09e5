//! Per-tenant admission control for the HTTP channel.
//!
//! Each tenant gets a limiter sized to its `max_requests_per_second`,
//! created lazily on first use. A successful acquire consumes a permit and
//! schedules its return one second later; an empty limiter rejects
//! immediately (non-blocking). Limiters idle for ten minutes are reclaimed
//! by a sweeper that runs every five minutes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long an unused limiter is retained.
const IDLE_TTL: Duration = Duration::from_secs(600);

/// Sweep interval for idle limiters.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Delay before a consumed permit is returned.
const PERMIT_RETURN_DELAY: Duration = Duration::from_secs(1);

/// A single tenant's limiter.
struct TenantLimiter {
    /// Permits currently available
    permits: AtomicU32,
    /// Capacity (tenant max requests per second)
    capacity: u32,
    /// Millis since limiter epoch of last use
    last_used_ms: AtomicU64,
    epoch: Instant,
}

impl TenantLimiter {
    fn new(capacity: u32) -> Self {
        Self {
            permits: AtomicU32::new(capacity),
            capacity,
            last_used_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_used_ms.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_used_ms.load(Ordering::Relaxed);
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(last))
    }

    fn try_acquire(self: &Arc<Self>) -> bool {
        self.touch();

        loop {
            let current = self.permits.load(Ordering::Relaxed);
            if current == 0 {
                return false;
            }

            if self
                .permits
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                // Return the permit after one second.
                let limiter = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(PERMIT_RETURN_DELAY).await;
                    limiter.release();
                });
                return true;
            }
        }
    }

    fn release(&self) {
        loop {
            let current = self.permits.load(Ordering::Relaxed);
            if current >= self.capacity {
                return;
            }
            if self
                .permits
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }
}

/// Per-tenant rate limiter map.
///
/// Advisory for the HTTP channel; SMPP pacing is enforced by the SMPP
/// client's own send-speed limit. Fails closed: any internal inconsistency
/// reads as a rejection.
pub struct TenantRateLimiter {
    limiters: RwLock<HashMap<String, Arc<TenantLimiter>>>,
}

impl TenantRateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            limiters: RwLock::new(HashMap::new()),
        })
    }

    /// Try to admit one request for the tenant.
    ///
    /// `capacity` is the tenant's configured max requests per second; a zero
    /// capacity always rejects.
    pub async fn try_acquire(&self, tenant_key: &str, capacity: u32) -> bool {
        if capacity == 0 {
            return false;
        }

        let limiter = {
            let limiters = self.limiters.read().await;
            limiters.get(tenant_key).cloned()
        };

        let limiter = match limiter {
            Some(limiter) => limiter,
            None => {
                let mut limiters = self.limiters.write().await;
                limiters
                    .entry(tenant_key.to_string())
                    .or_insert_with(|| {
                        debug!(tenant = %tenant_key, capacity, "creating rate limiter");
                        Arc::new(TenantLimiter::new(capacity))
                    })
                    .clone()
            }
        };

        let admitted = limiter.try_acquire();
        if !admitted {
            warn!(tenant = %tenant_key, "rate limit exceeded");
            crate::telemetry::counters::rate_limit_rejected(tenant_key);
        }
        admitted
    }

    /// Remove limiters idle longer than [`IDLE_TTL`].
    pub async fn sweep_idle(&self) -> usize {
        let mut limiters = self.limiters.write().await;
        let before = limiters.len();
        limiters.retain(|_, limiter| limiter.idle_for() < IDLE_TTL);
        let removed = before - limiters.len();

        if removed > 0 {
            debug!(removed, "reclaimed idle rate limiters");
        }
        removed
    }

    /// Number of live limiters.
    pub async fn len(&self) -> usize {
        self.limiters.read().await.len()
    }

    /// Spawn the periodic idle sweeper.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown_rx: tokio::sync::watch::Receiver<crate::bootstrap::ShutdownState>,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow_and_update() != crate::bootstrap::ShutdownState::Running {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        limiter.sweep_idle().await;
                    }
                }
            }
        })
    }
}

impl Default for TenantRateLimiter {
    fn default() -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_within_capacity() {
        let limiter = TenantRateLimiter::new();

        assert!(limiter.try_acquire("demo-key", 2).await);
        assert!(limiter.try_acquire("demo-key", 2).await);
        assert!(!limiter.try_acquire("demo-key", 2).await);
    }

    #[tokio::test]
    async fn test_tenants_isolated() {
        let limiter = TenantRateLimiter::new();

        assert!(limiter.try_acquire("tenant-a", 1).await);
        assert!(!limiter.try_acquire("tenant-a", 1).await);
        assert!(limiter.try_acquire("tenant-b", 1).await);
    }

    #[tokio::test]
    async fn test_zero_capacity_rejects() {
        let limiter = TenantRateLimiter::new();
        assert!(!limiter.try_acquire("demo-key", 0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_returned_after_one_second() {
        let limiter = TenantRateLimiter::new();

        assert!(limiter.try_acquire("demo-key", 1).await);
        assert!(!limiter.try_acquire("demo-key", 1).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(limiter.try_acquire("demo-key", 1).await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_active_limiters() {
        let limiter = TenantRateLimiter::new();
        limiter.try_acquire("demo-key", 5).await;

        assert_eq!(limiter.len().await, 1);
        limiter.sweep_idle().await;
        assert_eq!(limiter.len().await, 1);
    }
}
