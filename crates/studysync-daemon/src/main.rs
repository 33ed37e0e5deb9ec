//! StudySync Daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Connectivity probing against the study server
//! - Draining the offline queue whenever the server is reachable
//! - Periodic question cache refresh
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon opens the offline store, builds a `SyncCoordinator` and enters
//! a probe loop that feeds connectivity changes into it. The loop is
//! controlled by a `CancellationToken` that is triggered on receipt of
//! SIGTERM or SIGINT.

use std::{ffi::OsString, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use studysync_api::client::StudyApiClient;
use studysync_core::{config::Config, ports::IOfflineStore};
use studysync_store::{DatabasePool, SqliteOfflineStore};
use studysync_sync::{
    coordinator::PassHandle, host::NoHostScheduler, metrics::SyncMetrics, EventBus, Subscription,
    SyncContext, SyncCoordinator, SyncEvent,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "STUDYSYNC_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the store, the coordinator and the probe loop
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    store: Arc<dyn IOfflineStore>,
    api: StudyApiClient,
    coordinator: Arc<SyncCoordinator>,
    metrics: Arc<SyncMetrics>,
    shutdown: CancellationToken,
    /// Keeps the event logger attached
    _event_log: Subscription,
}

impl DaemonService {
    /// Opens the database, probes the server once and builds the coordinator
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        for problem in config.validate() {
            warn!(field = %problem.field, message = %problem.message, "Configuration problem");
        }

        let db_pool = DatabasePool::from_config(&config.storage)
            .await
            .context("Failed to open offline store")?;
        let store: Arc<dyn IOfflineStore> =
            Arc::new(SqliteOfflineStore::new(db_pool.pool().clone()));

        let api = StudyApiClient::from_config(&config.api)
            .context("Failed to create study API client")?;

        let metrics = Arc::new(SyncMetrics::new().context("Failed to create metrics registry")?);
        let events = Arc::new(EventBus::new());
        let event_log = events.subscribe(log_event);

        let online = probe(&api).await;
        info!(is_online = online, base_url = %api.base_url(), "Initial connectivity probe");

        let coordinator = SyncCoordinator::new(
            SyncContext {
                store: Arc::clone(&store),
                api: Arc::new(api.clone()),
                host: Arc::new(NoHostScheduler),
                events,
                metrics: Some(Arc::clone(&metrics)),
            },
            &config,
            online,
        );

        Ok(Self {
            config,
            db_pool,
            store,
            api,
            coordinator: Arc::new(coordinator),
            metrics,
            shutdown,
            _event_log: event_log,
        })
    }

    // ========================================================================
    // DaemonService::run() - async main loop
    // ========================================================================

    /// Runs the daemon until the shutdown token is cancelled
    ///
    /// 1. Runs the coordinator startup sequence (recovery, first pass, refresh)
    /// 2. Probes connectivity every `connectivity.probe_interval_secs`
    /// 3. While online, retries pending items on every probe tick
    async fn run(&self) -> Result<()> {
        match self.coordinator.start().await {
            Ok(Some(result)) => info!(
                total_processed = result.total_processed,
                successful = result.successful,
                "Startup sync pass finished"
            ),
            Ok(None) => debug!("No startup sync pass"),
            Err(e) => error!(error = %format!("{e:#}"), "Startup sync pass failed"),
        }

        let probe_secs = self.config.connectivity.probe_interval_secs.max(1);
        info!(probe_interval_secs = probe_secs, "Starting connectivity loop");

        let mut interval = tokio::time::interval(Duration::from_secs(probe_secs));
        // The first tick fires immediately; startup already probed
        interval.tick().await;

        let mut in_flight: Option<PassHandle> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(handle) = self.on_probe_tick().await {
                        in_flight = Some(handle);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.coordinator.shutdown().await;
        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync pass task ended abnormally");
            }
        }

        match self.metrics.encode() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to encode metrics"),
        }
        self.db_pool.close().await;

        info!("Connectivity loop terminated");
        Ok(())
    }

    /// Probes the server and starts a pass when one is due
    async fn on_probe_tick(&self) -> Option<PassHandle> {
        let online = probe(&self.api).await;
        if let Some(handle) = self.coordinator.set_online(online) {
            return Some(handle);
        }
        if !online || self.coordinator.is_syncing() {
            return None;
        }

        match self.store.get_pending_count().await {
            Ok(0) => None,
            Ok(pending) => {
                debug!(pending, "Retrying pending items");
                let coordinator = Arc::clone(&self.coordinator);
                Some(tokio::spawn(async move {
                    let result = coordinator.sync_now().await;
                    if let Err(e) = &result {
                        error!(error = %format!("{e:#}"), "Sync pass failed");
                    }
                    result
                }))
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to read pending count");
                None
            }
        }
    }
}

/// Any HTTP answer from the health endpoint counts as online
async fn probe(api: &StudyApiClient) -> bool {
    match api.ping().await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Connectivity probe failed");
            false
        }
    }
}

fn log_event(event: &SyncEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!(event = event.name(), payload = %json, "Sync event"),
        Err(e) => warn!(event = event.name(), error = %e, "Failed to serialize sync event"),
    }
}

fn resolve_config_path(explicit: Option<OsString>) -> PathBuf {
    explicit
        .filter(|value| !value.is_empty())
        .map_or_else(Config::default_path, PathBuf::from)
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path(std::env::var_os(CONFIG_ENV));
    let config = Config::load_or_default(&config_path);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "StudySync daemon starting (studysyncd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("StudySync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "StudySync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
