//! Connectivity and lifecycle coordinator
//!
//! Owns the online/offline state, wires the processor and the cache manager
//! to it, and translates host callbacks (connectivity changes, background
//! wake-ups, periodic refresh) into processor passes and cache refreshes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use studysync_core::config::{CacheConfig, Config};
use studysync_core::domain::{CertificationId, QueueItemId, QueueItemKind};
use studysync_core::ports::{IHostScheduler, IOfflineStore, IStudyApi};

use crate::cache_manager::{CacheManager, CacheSettings, RefreshSummary};
use crate::events::{EventBus, SyncEvent};
use crate::metrics::SyncMetrics;
use crate::processor::{ProcessorConfig, SyncQueueProcessor, SyncResult};

/// Tag used when asking the host for a one-off background sync
pub const BACKGROUND_SYNC_TAG: &str = "offline-sync";

/// Tag used for the periodic question cache refresh
pub const PERIODIC_REFRESH_TAG: &str = "question-cache-refresh";

/// Handle of a pass started in the background
pub type PassHandle = JoinHandle<anyhow::Result<Option<SyncResult>>>;

/// Shared collaborators of the coordinator
pub struct SyncContext {
    pub store: Arc<dyn IOfflineStore>,
    pub api: Arc<dyn IStudyApi>,
    pub host: Arc<dyn IHostScheduler>,
    pub events: Arc<EventBus>,
    pub metrics: Option<Arc<SyncMetrics>>,
}

/// Periodic refresh schedule
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub refresh_interval: Duration,
    pub startup_refresh_delay: Duration,
    /// Certifications refreshed even when nothing is cached for them yet
    pub certifications: Vec<CertificationId>,
}

impl CoordinatorSettings {
    /// Builds the schedule; invalid certification ids are logged and skipped
    pub fn from_config(config: &CacheConfig) -> Self {
        let certifications = config
            .certifications
            .iter()
            .filter_map(|&id| match CertificationId::new(id) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(certification_id = id, error = %e, "Ignoring configured certification");
                    None
                }
            })
            .collect();

        Self {
            refresh_interval: Duration::from_secs(config.refresh_interval_hours.saturating_mul(3_600)),
            startup_refresh_delay: Duration::from_secs(config.startup_refresh_delay_secs),
            certifications,
        }
    }
}

pub struct SyncCoordinator {
    store: Arc<dyn IOfflineStore>,
    host: Arc<dyn IHostScheduler>,
    events: Arc<EventBus>,
    processor: Arc<SyncQueueProcessor>,
    cache: Arc<CacheManager>,
    online: watch::Sender<bool>,
    settings: CoordinatorSettings,
    shutdown: CancellationToken,
    started: AtomicBool,
    periodic_registered: AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(context: SyncContext, config: &Config, initially_online: bool) -> Self {
        let SyncContext {
            store,
            api,
            host,
            events,
            metrics,
        } = context;

        let shutdown = CancellationToken::new();
        let (online, online_rx) = watch::channel(initially_online);

        let mut processor = SyncQueueProcessor::new(
            Arc::clone(&store),
            Arc::clone(&api),
            Arc::clone(&events),
            online_rx,
            ProcessorConfig::from_config(&config.sync),
        )
        .with_shutdown(shutdown.child_token());

        let mut cache = CacheManager::new(
            Arc::clone(&store),
            api,
            Arc::clone(&events),
            CacheSettings::from_config(&config.cache),
        );

        if let Some(metrics) = metrics {
            processor = processor.with_metrics(Arc::clone(&metrics));
            cache = cache.with_metrics(metrics);
        }

        Self {
            store,
            host,
            events,
            processor: Arc::new(processor),
            cache: Arc::new(cache),
            online,
            settings: CoordinatorSettings::from_config(&config.cache),
            shutdown,
            started: AtomicBool::new(false),
            periodic_registered: AtomicBool::new(false),
            refresh_task: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn processor(&self) -> &Arc<SyncQueueProcessor> {
        &self.processor
    }

    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn is_syncing(&self) -> bool {
        self.processor.is_syncing()
    }

    /// True when the host accepted the periodic refresh registration
    pub fn uses_host_periodic_refresh(&self) -> bool {
        self.periodic_registered.load(Ordering::Acquire)
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Records a connectivity change
    ///
    /// Going online starts a pass in the background and returns its handle.
    /// Repeating the current state is a no-op.
    pub fn set_online(&self, online: bool) -> Option<PassHandle> {
        let previous = self.online.send_replace(online);
        if previous == online {
            return None;
        }

        info!(is_online = online, "Connectivity changed");
        self.events
            .emit(SyncEvent::OnlineStatusChanged { is_online: online });

        online.then(|| self.spawn_pass())
    }

    fn spawn_pass(&self) -> PassHandle {
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            let result = processor.process_queue().await;
            if let Err(e) = &result {
                error!(error = %e, "Sync pass failed");
            }
            result
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Startup sequence
    ///
    /// Recovers items left `in_progress` by a previous run, drains the queue
    /// when online, and sets up the periodic cache refresh. Calling it again
    /// is a no-op.
    pub async fn start(&self) -> anyhow::Result<Option<SyncResult>> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Coordinator already started");
            return Ok(None);
        }

        let recovered = self.store.recover_interrupted().await?;
        if recovered > 0 {
            info!(recovered, "Recovered interrupted queue items");
        }

        self.setup_periodic_refresh().await;

        if !self.is_online() {
            return Ok(None);
        }
        let pending = self.store.get_pending_count().await?;
        if pending == 0 {
            return Ok(None);
        }
        info!(pending, "Pending items found at startup");
        self.processor.process_queue().await
    }

    async fn setup_periodic_refresh(&self) {
        match self
            .host
            .register_periodic_sync(PERIODIC_REFRESH_TAG, self.settings.refresh_interval)
            .await
        {
            Ok(true) => {
                info!(tag = PERIODIC_REFRESH_TAG, "Host periodic refresh registered");
                self.periodic_registered.store(true, Ordering::Release);
            }
            Ok(false) => {
                info!("Host periodic refresh unavailable, using local timer");
                self.start_fallback_refresh();
            }
            Err(e) => {
                warn!(error = %e, "Host periodic refresh registration failed, using local timer");
                self.start_fallback_refresh();
            }
        }
    }

    fn start_fallback_refresh(&self) {
        let mut slot = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let cache = Arc::clone(&self.cache);
        let token = self.shutdown.child_token();
        let certifications = self.settings.certifications.clone();
        let delay = self.settings.startup_refresh_delay;
        let period = self.settings.refresh_interval;

        *slot = Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            run_refresh(&cache, &certifications).await;

            if period.is_zero() {
                return;
            }
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => run_refresh(&cache, &certifications).await,
                }
            }
            debug!("Fallback cache refresh stopped");
        }));
    }

    /// Cancels timers and stops the processor after the current item
    pub async fn shutdown(&self) {
        info!("Shutting down sync coordinator");
        self.shutdown.cancel();

        let task = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Fallback refresh task ended abnormally");
            }
        }

        if self.periodic_registered.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.host.unregister_periodic_sync(PERIODIC_REFRESH_TAG).await {
                warn!(error = %e, "Failed to unregister host periodic refresh");
            }
        }
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Persists a new queue item
    ///
    /// While offline the host is asked for a background sync. That request
    /// is best effort; the item stays queued for the foreground triggers.
    pub async fn enqueue(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
        correlation_key: Option<String>,
    ) -> anyhow::Result<QueueItemId> {
        let id = self.store.enqueue(kind, payload, correlation_key).await?;
        debug!(item_id = %id, kind = %kind, "Item queued");

        if !self.is_online() {
            if let Err(e) = self.host.request_background_sync(BACKGROUND_SYNC_TAG).await {
                warn!(item_id = %id, error = %e, "Background sync request failed");
            }
        }
        Ok(id)
    }

    /// Host background wake-up
    pub async fn on_background_sync(&self) -> anyhow::Result<Option<SyncResult>> {
        info!("Background sync requested by host");
        self.processor.process_queue().await
    }

    /// Host periodic wake-up: refreshes the question cache
    pub async fn on_periodic_sync(&self) -> anyhow::Result<RefreshSummary> {
        self.cache.refresh_all(&self.settings.certifications).await
    }

    /// Manual "sync now"
    ///
    /// Returns `None` while offline or while a pass is running.
    pub async fn sync_now(&self) -> anyhow::Result<Option<SyncResult>> {
        if !self.is_online() {
            debug!("Sync now ignored while offline");
            return Ok(None);
        }
        if self.is_syncing() {
            debug!("Sync now ignored while syncing");
            return Ok(None);
        }
        self.processor.process_queue().await
    }
}

async fn run_refresh(cache: &CacheManager, certifications: &[CertificationId]) {
    match cache.refresh_all(certifications).await {
        Ok(summary) => {
            for (certification_id, error) in &summary.failed {
                warn!(certification_id = %certification_id, error = %error, "Scheduled cache refresh failed");
            }
        }
        Err(e) => error!(error = %e, "Scheduled cache refresh aborted"),
    }
}
