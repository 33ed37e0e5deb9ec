//! Sync queue processor
//!
//! Drains the durable queue one item at a time, oldest first, and
//! classifies every server response into success, permanent failure or
//! transient failure.
//!
//! ## Pass lifecycle
//!
//! 1. Acquire the process-wide pass flag (a concurrent trigger gets `None`)
//! 2. Snapshot the eligible items; items enqueued later wait for the next pass.
//!    Failed items whose backoff has not elapsed since their last attempt are
//!    deferred to a later pass
//! 3. For each item: dead-letter when the retry budget is spent, otherwise
//!    mark it in progress, POST it and apply the classified outcome
//! 4. Emit `sync:completed` and record metrics
//!
//! A pass stops between items when the device goes offline or the processor
//! is shut down. Per-item failures never abort a pass; store errors do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use studysync_core::config::SyncConfig;
use studysync_core::domain::SyncQueueItem;
use studysync_core::ports::{ApiResponse, IOfflineStore, IStudyApi};

use crate::backoff::BackoffPolicy;
use crate::events::{EventBus, SyncEvent};
use crate::metrics::SyncMetrics;

/// Status codes that will never succeed on retry
const PERMANENT_STATUSES: [u16; 3] = [400, 404, 409];

// ============================================================================
// Response classification
// ============================================================================

/// How a delivery attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The server accepted the item (or already had it)
    Success {
        already_synced: bool,
        server_response: serde_json::Value,
    },
    /// The server rejected the item for good
    Permanent { message: String },
    /// The attempt may succeed later
    Transient { message: String },
}

/// Classifies an HTTP response from a submission endpoint
pub fn classify_response(response: &ApiResponse) -> DispatchOutcome {
    if response.is_success() {
        let already_synced = response
            .body
            .get("alreadySynced")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        return DispatchOutcome::Success {
            already_synced,
            server_response: response.body.clone(),
        };
    }

    let message = response.error_message();
    if PERMANENT_STATUSES.contains(&response.status) {
        DispatchOutcome::Permanent {
            message: format!("Permanent failure: {message}"),
        }
    } else {
        DispatchOutcome::Transient { message }
    }
}

// ============================================================================
// SyncResult / ProcessorConfig
// ============================================================================

/// Summary of one processing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub total_processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub dead_lettered: u32,
    pub already_synced: u32,
    /// Items left queued because their backoff had not elapsed
    pub deferred: u32,
    /// True when the pass stopped before reaching the end of its snapshot
    pub stopped_early: bool,
    pub duration_ms: u64,
}

/// Processor tuning knobs
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_retries: u32,
    /// Upper bound on the wait after a transient failure
    pub max_inter_item_wait: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl ProcessorConfig {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_inter_item_wait: Duration::from_millis(config.max_inter_item_wait_ms),
            backoff: BackoffPolicy::from_config(config),
        }
    }
}

/// Outcome of a single item as seen by the pass loop
enum ItemOutcome {
    Synced { already_synced: bool },
    DeadLettered,
    Retrying { delay: Duration },
}

/// Releases the pass flag when dropped
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// SyncQueueProcessor
// ============================================================================

/// Drains the offline queue against the study API
pub struct SyncQueueProcessor {
    store: Arc<dyn IOfflineStore>,
    api: Arc<dyn IStudyApi>,
    events: Arc<EventBus>,
    metrics: Option<Arc<SyncMetrics>>,
    online: watch::Receiver<bool>,
    shutdown: CancellationToken,
    syncing: AtomicBool,
    config: ProcessorConfig,
}

impl SyncQueueProcessor {
    pub fn new(
        store: Arc<dyn IOfflineStore>,
        api: Arc<dyn IStudyApi>,
        events: Arc<EventBus>,
        online: watch::Receiver<bool>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            api,
            events,
            metrics: None,
            online,
            shutdown: CancellationToken::new(),
            syncing: AtomicBool::new(false),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Returns true while a pass is running
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Stops the current pass after the item in flight
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs one pass over the queue
    ///
    /// Returns `Ok(None)` without touching the queue when another pass is
    /// running or the device is offline.
    #[tracing::instrument(skip(self))]
    pub async fn process_queue(&self) -> anyhow::Result<Option<SyncResult>> {
        let Some(_guard) = PassGuard::acquire(&self.syncing) else {
            debug!("Sync pass already running, ignoring trigger");
            return Ok(None);
        };

        if !self.is_online() {
            debug!("Device offline, skipping sync pass");
            return Ok(None);
        }

        let started = Instant::now();
        let outcome = self.run_pass().await;
        let duration = started.elapsed();

        match outcome {
            Ok(mut result) => {
                result.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                if let Some(metrics) = &self.metrics {
                    let label = if result.stopped_early { "interrupted" } else { "completed" };
                    metrics.record_pass(label, duration.as_secs_f64());
                    if let Ok(pending) = self.store.get_pending_count().await {
                        metrics.set_pending(pending);
                    }
                }
                Ok(Some(result))
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_pass("error", duration.as_secs_f64());
                }
                Err(e)
            }
        }
    }

    async fn run_pass(&self) -> anyhow::Result<SyncResult> {
        let now = Utc::now();
        let (items, deferred): (Vec<_>, Vec<_>) = self
            .store
            .get_pending()
            .await?
            .into_iter()
            .partition(|item| self.is_due(item, now));
        let mut result = SyncResult {
            deferred: u32::try_from(deferred.len()).unwrap_or(u32::MAX),
            ..SyncResult::default()
        };

        if items.is_empty() {
            debug!(deferred = result.deferred, "No items due");
            return Ok(result);
        }

        let pending_count = items.len() as u64;
        info!(pending_count, "Starting sync pass");
        self.events.emit(SyncEvent::SyncStarted { pending_count });

        let total = items.len();
        for (index, item) in items.into_iter().enumerate() {
            if self.shutdown.is_cancelled() {
                info!("Sync pass cancelled, remaining items stay queued");
                result.stopped_early = true;
                break;
            }
            if !self.is_online() {
                info!("Device went offline, remaining items stay queued");
                result.stopped_early = true;
                break;
            }

            let kind = item.kind;
            let outcome = self.process_item(item).await?;
            result.total_processed += 1;

            let label = match outcome {
                ItemOutcome::Synced { already_synced } => {
                    result.successful += 1;
                    if already_synced {
                        result.already_synced += 1;
                        "already_synced"
                    } else {
                        "success"
                    }
                }
                ItemOutcome::DeadLettered => {
                    result.dead_lettered += 1;
                    "dead_letter"
                }
                ItemOutcome::Retrying { .. } => {
                    result.failed += 1;
                    "failed"
                }
            };
            if let Some(metrics) = &self.metrics {
                metrics.record_item(kind.as_str(), label);
            }

            if let ItemOutcome::Retrying { delay } = outcome {
                if index + 1 < total {
                    self.wait_between_items(delay).await;
                }
            }
        }

        info!(
            total_processed = result.total_processed,
            successful = result.successful,
            failed = result.failed,
            dead_lettered = result.dead_lettered,
            already_synced = result.already_synced,
            deferred = result.deferred,
            stopped_early = result.stopped_early,
            "Sync pass finished"
        );
        self.events.emit(SyncEvent::SyncCompleted {
            total_processed: result.total_processed,
            successful: result.successful,
            failed: result.failed,
            dead_lettered: result.dead_lettered,
            already_synced: result.already_synced,
        });

        Ok(result)
    }

    /// Exhausted items are always due so they reach the dead letter
    fn is_due(&self, item: &SyncQueueItem, now: chrono::DateTime<Utc>) -> bool {
        if item.is_exhausted(self.config.max_retries) {
            return true;
        }
        let backoff = Duration::from_millis(self.config.backoff.base_delay_ms(item.retry_count));
        item.is_due(now, backoff)
    }

    async fn process_item(&self, mut item: SyncQueueItem) -> anyhow::Result<ItemOutcome> {
        if item.is_exhausted(self.config.max_retries) {
            let error = item
                .last_error
                .clone()
                .unwrap_or_else(|| "Maximum retries exceeded".to_string());
            return self.dead_letter(item, error).await;
        }

        item.mark_in_progress(Utc::now())?;
        self.store.update(&item).await?;

        debug!(item_id = %item.id, retry_count = item.retry_count, "Dispatching item");
        let outcome = match self.api.submit_offline(item.kind, &item.request_body()).await {
            Ok(response) => classify_response(&response),
            Err(e) => DispatchOutcome::Transient {
                message: format!("{e:#}"),
            },
        };

        match outcome {
            DispatchOutcome::Success {
                already_synced,
                server_response,
            } => {
                self.store.remove(&item.id).await?;
                info!(item_id = %item.id, kind = %item.kind, already_synced, "Item synced");
                self.events.emit(SyncEvent::ItemSuccess {
                    item,
                    already_synced,
                    server_response,
                });
                Ok(ItemOutcome::Synced { already_synced })
            }
            DispatchOutcome::Permanent { message } => self.dead_letter(item, message).await,
            DispatchOutcome::Transient { message } => {
                item.record_transient_failure(message.clone());
                self.store.update(&item).await?;

                let delay = self.config.backoff.delay(item.retry_count);
                warn!(
                    item_id = %item.id,
                    kind = %item.kind,
                    retry_count = item.retry_count,
                    error = %message,
                    "Item failed, will retry"
                );
                self.events.emit(SyncEvent::ItemFailed {
                    item,
                    error: message,
                    next_retry_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                });
                Ok(ItemOutcome::Retrying { delay })
            }
        }
    }

    async fn dead_letter(&self, item: SyncQueueItem, error: String) -> anyhow::Result<ItemOutcome> {
        self.store.move_to_dead_letter(&item.id, &error).await?;
        warn!(
            item_id = %item.id,
            kind = %item.kind,
            retry_count = item.retry_count,
            error = %error,
            "Item moved to dead letter"
        );
        self.events.emit(SyncEvent::ItemDeadLetter { item, error });
        Ok(ItemOutcome::DeadLettered)
    }

    async fn wait_between_items(&self, delay: Duration) {
        let wait = delay.min(self.config.max_inter_item_wait);
        if wait.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}
