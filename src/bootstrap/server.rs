use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api;
use crate::channel::{ChannelRouter, HttpChannel, SmppChannel};
use crate::config::Config;
use crate::queue::create_queue;
use crate::ratelimit::TenantRateLimiter;
use crate::store::create_repository;
use crate::submit::SubmissionHandler;
use crate::worker::DeliveryWorker;

use super::shutdown::ShutdownManager;
use super::state::{HubState, SharedHubState, TenantRegistry};

/// Fully-wired hub: repository, queue, channels, workers and sweepers.
///
/// Built from config, started once, stopped once. The API router is handed
/// out separately so integration tests can drive the hub without a socket.
pub struct Hub {
    pub state: SharedHubState,
    pub shutdown: Arc<ShutdownManager>,
    limiter: Arc<TenantRateLimiter>,
    router: Arc<ChannelRouter>,
    smpp_channel: Arc<SmppChannel>,
    worker_handle: Option<JoinHandle<()>>,
    sweeper_handle: Option<JoinHandle<()>>,
}

impl Hub {
    /// Wire all components from a validated config.
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let repository = create_repository(&config.store)?;
        let queue = create_queue(&config.queue)?;
        let tenants = Arc::new(TenantRegistry::new(&config));
        let limiter = TenantRateLimiter::new();
        let shutdown = ShutdownManager::new(config.shutdown.drain_timeout);

        let http_channel = Arc::new(
            HttpChannel::new(&config.tenants, limiter.clone())
                .context("failed to build HTTP channel")?,
        );
        let smpp_channel = Arc::new(SmppChannel::new(
            &config.tenants,
            repository.clone(),
            shutdown.subscribe(),
        ));

        let router = Arc::new(ChannelRouter::new(http_channel, smpp_channel.clone()));

        let submission = Arc::new(SubmissionHandler::new(
            repository.clone(),
            queue.clone(),
            tenants.clone(),
        ));

        let state = Arc::new(HubState {
            config: config.clone(),
            tenants,
            repository,
            queue,
            submission,
            started_at: Instant::now(),
        });

        info!(
            tenants = state.tenants.len(),
            worker_concurrency = config.worker.concurrency,
            "hub wired"
        );

        Ok(Self {
            state,
            shutdown,
            limiter,
            router,
            smpp_channel,
            worker_handle: None,
            sweeper_handle: None,
        })
    }

    /// Build the API router bound to this hub's state.
    pub fn api_router(&self) -> axum::Router {
        api::router(self.state.clone())
    }

    /// Start the delivery worker and background sweepers.
    pub fn start(&mut self) -> Result<()> {
        let consumer = self
            .state
            .queue
            .take_consumer()
            .context("queue consumer already taken")?;

        let worker = DeliveryWorker::new(
            self.state.repository.clone(),
            self.router.clone(),
            self.state.tenants.clone(),
            self.state.config.worker.concurrency,
            self.shutdown.clone(),
        );

        self.worker_handle = Some(tokio::spawn(worker.run(consumer)));
        self.sweeper_handle = Some(self.limiter.spawn_sweeper(self.shutdown.subscribe()));

        Ok(())
    }

    /// Drain and stop: no new deliveries, in-flight finish (bounded), SMPP
    /// pools unbind, background tasks stop.
    pub async fn stop(&mut self) {
        self.shutdown.start_drain();
        self.shutdown.wait_for_drain().await;

        self.smpp_channel.shutdown().await;

        if let Some(handle) = self.worker_handle.take() {
            if tokio::time::timeout(std::time::Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                error!("delivery worker did not stop in time");
            }
        }

        if let Some(handle) = self.sweeper_handle.take() {
            handle.abort();
        }
    }
}

/// Main smshubd server.
///
/// Components:
/// - Submission API (axum) with graceful shutdown
/// - Delivery worker consuming the queue transport
/// - Background sweepers (idle rate limiters, stale DLR correlations)
/// - Shutdown manager draining in-flight deliveries on SIGINT/SIGTERM
pub struct Server {
    hub: Hub,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            hub: Hub::new(config)?,
        })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(mut self) -> Result<()> {
        self.hub.start()?;

        let address = self.hub.state.config.api.address;
        let router = self.hub.api_router();

        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind API address {address}"))?;

        info!(address = %address, "submission API listening");

        let shutdown = self.hub.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                wait_for_signal().await;
                info!("shutdown signal received, stopping API");
                shutdown.start_drain();
            })
            .await
            .context("API server failed")?;

        self.hub.stop().await;

        info!("smshubd stopped");
        Ok(())
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}
