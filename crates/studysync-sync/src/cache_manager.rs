//! Question cache manager
//!
//! Downloads question sets per certification so practice works offline,
//! and evicts them on request. At most one refresh per certification is in
//! flight; a concurrent request is rejected without touching the store.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use studysync_core::config::CacheConfig;
use studysync_core::domain::{CacheStatus, CachedQuestionSet, CertificationId};
use studysync_core::ports::{IOfflineStore, IStudyApi};

use crate::events::{EventBus, SyncEvent};
use crate::metrics::SyncMetrics;
use crate::CacheManagerError;

/// Cache population settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_question_count: u32,
    pub ttl: chrono::Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl CacheSettings {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            default_question_count: config.default_question_count,
            ttl: chrono::Duration::days(i64::from(config.ttl_days)),
        }
    }
}

/// Outcome of [`CacheManager::refresh_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: Vec<CertificationId>,
    /// Skipped because a refresh was already running
    pub skipped: Vec<CertificationId>,
    pub failed: Vec<(CertificationId, String)>,
}

/// Removes a certification from the in-flight set when dropped
struct RefreshGuard<'a> {
    in_flight: &'a DashMap<CertificationId, ()>,
    certification_id: CertificationId,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.certification_id);
    }
}

pub struct CacheManager {
    store: Arc<dyn IOfflineStore>,
    api: Arc<dyn IStudyApi>,
    events: Arc<EventBus>,
    metrics: Option<Arc<SyncMetrics>>,
    settings: CacheSettings,
    in_flight: DashMap<CertificationId, ()>,
}

impl CacheManager {
    pub fn new(
        store: Arc<dyn IOfflineStore>,
        api: Arc<dyn IStudyApi>,
        events: Arc<EventBus>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            api,
            events,
            metrics: None,
            settings,
            in_flight: DashMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn begin_refresh(
        &self,
        certification_id: CertificationId,
    ) -> Result<RefreshGuard<'_>, CacheManagerError> {
        if self.in_flight.insert(certification_id, ()).is_some() {
            return Err(CacheManagerError::RefreshInProgress(certification_id));
        }
        Ok(RefreshGuard {
            in_flight: &self.in_flight,
            certification_id,
        })
    }

    /// Fetches and stores up to `count` questions for a certification
    ///
    /// `count` defaults to the configured question count.
    #[tracing::instrument(skip(self))]
    pub async fn cache_questions_for_certification(
        &self,
        certification_id: CertificationId,
        count: Option<u32>,
    ) -> Result<CacheStatus, CacheManagerError> {
        let _guard = self.begin_refresh(certification_id)?;
        let count = count.unwrap_or(self.settings.default_question_count);

        match self.fetch_and_store(certification_id, count).await {
            Ok(status) => {
                info!(
                    certification_id = %certification_id,
                    question_count = status.question_count,
                    expires_at = %status.expires_at,
                    "Questions cached"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_refresh("completed");
                }
                self.events.emit(SyncEvent::CacheCompleted {
                    certification_id,
                    question_count: status.question_count,
                    cached_at: status.cached_at,
                    expires_at: status.expires_at,
                });
                Ok(status)
            }
            Err(e) => {
                warn!(certification_id = %certification_id, error = %e, "Question caching failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_refresh("failed");
                }
                self.events.emit(SyncEvent::CacheFailed {
                    certification_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn fetch_and_store(
        &self,
        certification_id: CertificationId,
        count: u32,
    ) -> Result<CacheStatus, CacheManagerError> {
        let questions = self
            .api
            .fetch_questions(certification_id, count)
            .await
            .map_err(CacheManagerError::Fetch)?;

        self.store
            .write_cache(certification_id, &questions, self.settings.ttl)
            .await
            .map_err(CacheManagerError::Store)
    }

    /// Removes the cached set for a certification
    ///
    /// Returns whether an entry existed. `cache:cleared` is emitted either way.
    pub async fn clear_cache(&self, certification_id: CertificationId) -> anyhow::Result<bool> {
        let removed = self.store.clear_cache(certification_id).await?;
        info!(certification_id = %certification_id, removed, "Question cache cleared");
        self.events.emit(SyncEvent::CacheCleared { certification_id });
        Ok(removed)
    }

    /// Status of every stored certification
    pub async fn get_all_cache_status(&self) -> anyhow::Result<Vec<CacheStatus>> {
        self.store.list_all_cache_statuses().await
    }

    pub async fn get_cached_questions(
        &self,
        certification_id: CertificationId,
    ) -> anyhow::Result<Option<CachedQuestionSet>> {
        self.store.get_cached_questions(certification_id).await
    }

    /// Refreshes every cached certification plus `extra`
    ///
    /// Individual failures are logged and collected; they do not stop the
    /// remaining refreshes.
    #[tracing::instrument(skip(self, extra))]
    pub async fn refresh_all(&self, extra: &[CertificationId]) -> anyhow::Result<RefreshSummary> {
        let mut targets: BTreeSet<CertificationId> = self
            .store
            .list_all_cache_statuses()
            .await?
            .into_iter()
            .map(|status| status.certification_id)
            .collect();
        targets.extend(extra.iter().copied());

        let mut summary = RefreshSummary::default();
        for certification_id in targets {
            match self
                .cache_questions_for_certification(certification_id, None)
                .await
            {
                Ok(_) => summary.refreshed.push(certification_id),
                Err(CacheManagerError::RefreshInProgress(_)) => {
                    summary.skipped.push(certification_id)
                }
                Err(e) => summary.failed.push((certification_id, e.to_string())),
            }
        }

        info!(
            refreshed = summary.refreshed.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Question cache refresh finished"
        );
        Ok(summary)
    }
}
