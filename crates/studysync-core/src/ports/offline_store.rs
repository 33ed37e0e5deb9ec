//! Offline store port (driven/secondary port)
//!
//! This module defines the interface for the durable local store that holds
//! the sync queue, the dead-letter table and the per-certification question
//! cache.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite today) and don't need domain-level classification.
//! - Every operation is atomic with respect to one item or cache entry.
//!   `move_to_dead_letter` and `requeue_dead_letter` cross tables and must be
//!   a single transaction.
//! - Errors are never swallowed: a failed `enqueue` means the action was not
//!   persisted.

use chrono::Duration;

use crate::domain::{
    cache::StorageEstimate, CacheStatus, CachedQuestionSet, CertificationId, DeadLetterRecord,
    QueueItemId, QueueItemKind, SyncQueueItem,
};

/// Port trait for the durable local store
#[async_trait::async_trait]
pub trait IOfflineStore: Send + Sync {
    // --- Sync queue ---

    /// Persists a new pending item and returns its identifier
    async fn enqueue(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
        correlation_key: Option<String>,
    ) -> anyhow::Result<QueueItemId>;

    /// Returns `pending` and `failed` items, oldest first
    ///
    /// Ties on `created_at` are broken by insertion order.
    async fn get_pending(&self) -> anyhow::Result<Vec<SyncQueueItem>>;

    /// Looks up a single active item
    async fn get_item(&self, id: &QueueItemId) -> anyhow::Result<Option<SyncQueueItem>>;

    /// Overwrites the mutable fields of an active item
    async fn update(&self, item: &SyncQueueItem) -> anyhow::Result<()>;

    /// Removes an item from the active queue (confirmed by the server)
    async fn remove(&self, id: &QueueItemId) -> anyhow::Result<()>;

    /// Moves an item to the dead-letter table in one transaction
    async fn move_to_dead_letter(&self, id: &QueueItemId, error: &str) -> anyhow::Result<()>;

    /// Number of items in the active queue, whatever their status
    async fn get_pending_count(&self) -> anyhow::Result<u64>;

    /// Marks items left `in_progress` by a previous process as `failed`
    ///
    /// Returns the number of recovered items.
    async fn recover_interrupted(&self) -> anyhow::Result<u64>;

    // --- Dead letters ---

    /// Lists dead-lettered items, most recent first
    async fn list_dead_letters(&self) -> anyhow::Result<Vec<DeadLetterRecord>>;

    async fn dead_letter_count(&self) -> anyhow::Result<u64>;

    /// Moves a dead-lettered item back to the active queue with a fresh retry budget
    ///
    /// Returns false if no such record exists.
    async fn requeue_dead_letter(&self, id: &QueueItemId) -> anyhow::Result<bool>;

    /// Deletes a dead-lettered item permanently
    ///
    /// Returns false if no such record exists.
    async fn discard_dead_letter(&self, id: &QueueItemId) -> anyhow::Result<bool>;

    // --- Question cache ---

    async fn get_cache_status(
        &self,
        certification_id: CertificationId,
    ) -> anyhow::Result<Option<CacheStatus>>;

    /// Returns the cached questions even if the entry has expired
    async fn get_cached_questions(
        &self,
        certification_id: CertificationId,
    ) -> anyhow::Result<Option<CachedQuestionSet>>;

    /// Replaces the cache entry for a certification in a single statement
    async fn write_cache(
        &self,
        certification_id: CertificationId,
        questions: &[serde_json::Value],
        ttl: Duration,
    ) -> anyhow::Result<CacheStatus>;

    /// Removes the cache entry; returns false if there was none
    async fn clear_cache(&self, certification_id: CertificationId) -> anyhow::Result<bool>;

    /// Status of every cached certification, ordered by certification id
    async fn list_all_cache_statuses(&self) -> anyhow::Result<Vec<CacheStatus>>;

    /// Approximate bytes used by the store
    async fn storage_estimate(&self) -> anyhow::Result<StorageEstimate>;
}
