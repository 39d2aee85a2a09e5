use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Shutdown state machine
///
/// States:
/// 1. Running - normal operation
/// 2. Draining - stop accepting new work, let in-flight deliveries finish
/// 3. Terminated - everything stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

/// Manages graceful shutdown with a drain period.
pub struct ShutdownManager {
    /// Current state
    state: watch::Sender<ShutdownState>,

    /// Drain period duration
    drain_timeout: Duration,

    /// In-flight delivery count
    in_flight: AtomicU64,

    /// Shutdown complete signal
    complete_tx: broadcast::Sender<()>,
}

impl ShutdownManager {
    pub fn new(drain_timeout: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ShutdownState::Running);
        let (complete_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            state,
            drain_timeout,
            in_flight: AtomicU64::new(0),
            complete_tx,
        })
    }

    /// Get current state
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Subscribe to shutdown complete
    pub fn complete_signal(&self) -> broadcast::Receiver<()> {
        self.complete_tx.subscribe()
    }

    /// Drain period configured for this manager.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Start draining (called on SIGTERM/SIGINT)
    pub fn start_drain(&self) {
        if self.state() != ShutdownState::Running {
            return;
        }

        info!(
            drain_timeout_secs = self.drain_timeout.as_secs(),
            in_flight = self.in_flight(),
            "starting graceful shutdown drain"
        );

        let _ = self.state.send(ShutdownState::Draining);
    }

    /// Complete shutdown
    pub fn terminate(&self) {
        if self.state() == ShutdownState::Terminated {
            return;
        }

        let in_flight = self.in_flight();
        if in_flight > 0 {
            warn!(in_flight, "terminating with in-flight deliveries");
        }

        info!("shutdown complete");
        let _ = self.state.send(ShutdownState::Terminated);
        let _ = self.complete_tx.send(());
    }

    /// Register a delivery entering processing. Returns false during drain.
    pub fn delivery_started(&self) -> bool {
        if self.state() != ShutdownState::Running {
            return false;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Unregister a finished delivery.
    pub fn delivery_finished(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.state() == ShutdownState::Draining && prev == 1 {
            self.terminate();
        }
    }

    /// Get in-flight delivery count
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Check if accepting new work
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Wait for the drain to complete, bounded by the drain timeout.
    pub async fn wait_for_drain(&self) {
        if self.in_flight() == 0 {
            self.terminate();
            return;
        }

        let mut complete_rx = self.complete_signal();
        if tokio::time::timeout(self.drain_timeout, complete_rx.recv())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                "drain timeout reached, forcing shutdown"
            );
            self.terminate();
        }
    }
}
