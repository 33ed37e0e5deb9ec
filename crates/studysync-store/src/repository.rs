//! SQLite implementation of IOfflineStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! offline store port defined in studysync-core. It handles all domain
//! type serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type       | SQL Type | Strategy                                        |
//! |-------------------|----------|-------------------------------------------------|
//! | QueueItemId       | TEXT     | UUID string via `.to_string()` / `FromStr`      |
//! | CertificationId   | INTEGER  | `value()` / `CertificationId::new()`            |
//! | QueueItemKind     | TEXT     | `as_str()` / `FromStr`, unknown kinds are errors |
//! | QueueItemStatus   | TEXT     | `as_str()` / `FromStr`                          |
//! | DateTime<Utc>     | TEXT     | RFC 3339, fixed microsecond precision, `Z`      |
//! | payload / questions | TEXT   | serde_json                                      |
//!
//! Timestamps are written with a fixed width so that text ordering in
//! `ORDER BY created_at` matches chronological ordering.

use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use studysync_core::domain::{
    cache::StorageEstimate, CacheStatus, CachedQuestionSet, CertificationId, DeadLetterRecord,
    QueueItemId, QueueItemKind, QueueItemStatus, SyncQueueItem,
};
use studysync_core::ports::IOfflineStore;

use crate::StoreError;

const QUEUE_COLUMNS: &str = "id, kind, payload, correlation_key, status, retry_count, \
                             last_error, last_attempt_at, created_at";

const DEAD_LETTER_COLUMNS: &str = "id, kind, payload, correlation_key, retry_count, last_error, \
                                   last_attempt_at, created_at, error, dead_lettered_at";

/// SQLite-based implementation of the offline store port
///
/// All operations are performed through a connection pool. Operations that
/// touch two tables run inside a single transaction.
#[derive(Clone)]
pub struct SqliteOfflineStore {
    pool: SqlitePool,
}

impl SqliteOfflineStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp for storage
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn parse_id(s: &str) -> Result<QueueItemId, StoreError> {
    QueueItemId::from_str(s)
        .map_err(|e| StoreError::SerializationError(format!("Invalid QueueItemId '{}': {}", s, e)))
}

fn parse_kind(s: &str) -> Result<QueueItemKind, StoreError> {
    QueueItemKind::from_str(s).map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn parse_json(s: &str, what: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(s)
        .map_err(|e| StoreError::SerializationError(format!("Invalid {} JSON: {}", what, e)))
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a SyncQueueItem from a `sync_queue` row
fn queue_item_from_row(row: &SqliteRow) -> Result<SyncQueueItem, StoreError> {
    let id_str: String = row.get("id");
    let kind_str: String = row.get("kind");
    let payload_str: String = row.get("payload");
    let status_str: String = row.get("status");
    let retry_count: i64 = row.get("retry_count");
    let last_attempt_str: Option<String> = row.get("last_attempt_at");
    let created_at_str: String = row.get("created_at");

    Ok(SyncQueueItem {
        id: parse_id(&id_str)?,
        kind: parse_kind(&kind_str)?,
        payload: parse_json(&payload_str, "payload")?,
        correlation_key: row.get("correlation_key"),
        status: QueueItemStatus::from_str(&status_str)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?,
        retry_count: to_count(retry_count),
        last_error: row.get("last_error"),
        last_attempt_at: parse_optional_datetime(last_attempt_str)?,
        created_at: parse_datetime(&created_at_str)?,
    })
}

/// Reconstruct a DeadLetterRecord from a `dead_letters` row
///
/// Dead-lettered items carry no status; they come back as `pending`.
fn dead_letter_from_row(row: &SqliteRow) -> Result<DeadLetterRecord, StoreError> {
    let id_str: String = row.get("id");
    let kind_str: String = row.get("kind");
    let payload_str: String = row.get("payload");
    let retry_count: i64 = row.get("retry_count");
    let last_attempt_str: Option<String> = row.get("last_attempt_at");
    let created_at_str: String = row.get("created_at");
    let dead_lettered_str: String = row.get("dead_lettered_at");

    let item = SyncQueueItem {
        id: parse_id(&id_str)?,
        kind: parse_kind(&kind_str)?,
        payload: parse_json(&payload_str, "payload")?,
        correlation_key: row.get("correlation_key"),
        status: QueueItemStatus::Pending,
        retry_count: to_count(retry_count),
        last_error: row.get("last_error"),
        last_attempt_at: parse_optional_datetime(last_attempt_str)?,
        created_at: parse_datetime(&created_at_str)?,
    };

    Ok(DeadLetterRecord {
        item,
        error: row.get("error"),
        dead_lettered_at: parse_datetime(&dead_lettered_str)?,
    })
}

/// Reconstruct a CacheStatus from a `question_cache` row
fn cache_status_from_row(row: &SqliteRow) -> Result<CacheStatus, StoreError> {
    let certification_id: i64 = row.get("certification_id");
    let question_count: i64 = row.get("question_count");
    let cached_at_str: String = row.get("cached_at");
    let expires_at_str: String = row.get("expires_at");

    Ok(CacheStatus {
        certification_id: CertificationId::new(certification_id)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?,
        question_count: to_count(question_count),
        cached_at: parse_datetime(&cached_at_str)?,
        expires_at: parse_datetime(&expires_at_str)?,
    })
}

// ============================================================================
// Queue operations
// ============================================================================

impl SqliteOfflineStore {
    async fn insert_item(&self, item: &SyncQueueItem) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&item.payload)
            .map_err(|e| StoreError::SerializationError(format!("Invalid payload: {}", e)))?;

        sqlx::query(
            "INSERT INTO sync_queue \
             (id, kind, payload, correlation_key, status, retry_count, last_error, last_attempt_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(item.kind.as_str())
        .bind(payload)
        .bind(&item.correlation_key)
        .bind(item.status.as_str())
        .bind(i64::from(item.retry_count))
        .bind(&item.last_error)
        .bind(item.last_attempt_at.as_ref().map(format_datetime))
        .bind(format_datetime(&item.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn enqueue_item(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
        correlation_key: Option<String>,
    ) -> Result<QueueItemId, StoreError> {
        let item = SyncQueueItem::new(kind, payload, correlation_key)?;
        self.insert_item(&item).await?;

        tracing::debug!(item_id = %item.id, kind = %kind, "Enqueued sync item");
        Ok(item.id)
    }

    async fn fetch_pending(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue \
             WHERE status IN ('pending', 'failed') \
             ORDER BY created_at ASC, seq ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(queue_item_from_row).collect()
    }

    async fn fetch_item(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, StoreError> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(queue_item_from_row).transpose()
    }

    async fn update_item(&self, item: &SyncQueueItem) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sync_queue \
             SET status = ?, retry_count = ?, last_error = ?, last_attempt_at = ? \
             WHERE id = ?",
        )
        .bind(item.status.as_str())
        .bind(i64::from(item.retry_count))
        .bind(&item.last_error)
        .bind(item.last_attempt_at.as_ref().map(format_datetime))
        .bind(item.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(item.id.to_string()));
        }
        Ok(())
    }

    async fn remove_item(&self, id: &QueueItemId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn dead_letter_item(&self, id: &QueueItemId, error: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR REPLACE INTO dead_letters \
             (id, kind, payload, correlation_key, retry_count, last_error, last_attempt_at, \
              created_at, error, dead_lettered_at) \
             SELECT id, kind, payload, correlation_key, retry_count, last_error, last_attempt_at, \
                    created_at, ?, ? \
             FROM sync_queue WHERE id = ?",
        )
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(id.to_string()));
        }

        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(item_id = %id, error, "Moved item to dead letter");
        Ok(())
    }

    async fn count_active(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn recover_in_progress(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sync_queue SET status = 'failed' WHERE status = 'in_progress'",
        )
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            tracing::info!(recovered, "Recovered interrupted sync items");
        }
        Ok(recovered)
    }
}

// ============================================================================
// Dead-letter operations
// ============================================================================

impl SqliteOfflineStore {
    async fn fetch_dead_letters(&self) -> Result<Vec<DeadLetterRecord>, StoreError> {
        let sql = format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters ORDER BY dead_lettered_at DESC, id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(dead_letter_from_row).collect()
    }

    async fn count_dead_letters(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn requeue(&self, id: &QueueItemId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO sync_queue \
             (id, kind, payload, correlation_key, status, retry_count, last_error, last_attempt_at, created_at) \
             SELECT id, kind, payload, correlation_key, 'pending', 0, NULL, NULL, created_at \
             FROM dead_letters WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM dead_letters WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(item_id = %id, "Requeued dead-lettered item");
        Ok(true)
    }

    async fn discard(&self, id: &QueueItemId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM dead_letters WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Question cache operations
// ============================================================================

impl SqliteOfflineStore {
    async fn fetch_cache_status(
        &self,
        certification_id: CertificationId,
    ) -> Result<Option<CacheStatus>, StoreError> {
        let row = sqlx::query(
            "SELECT certification_id, question_count, cached_at, expires_at \
             FROM question_cache WHERE certification_id = ?",
        )
        .bind(certification_id.value())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(cache_status_from_row).transpose()
    }

    async fn fetch_cached_questions(
        &self,
        certification_id: CertificationId,
    ) -> Result<Option<CachedQuestionSet>, StoreError> {
        let row = sqlx::query(
            "SELECT certification_id, questions, question_count, cached_at, expires_at \
             FROM question_cache WHERE certification_id = ?",
        )
        .bind(certification_id.value())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status = cache_status_from_row(&row)?;
        let questions_str: String = row.get("questions");
        let questions: Vec<serde_json::Value> = serde_json::from_str(&questions_str)
            .map_err(|e| StoreError::SerializationError(format!("Invalid questions JSON: {}", e)))?;

        Ok(Some(CachedQuestionSet { status, questions }))
    }

    async fn replace_cache(
        &self,
        certification_id: CertificationId,
        questions: &[serde_json::Value],
        ttl: Duration,
    ) -> Result<CacheStatus, StoreError> {
        let question_count = u32::try_from(questions.len()).map_err(|_| {
            StoreError::InvalidInput(format!("too many questions: {}", questions.len()))
        })?;
        let status = CacheStatus::new(certification_id, question_count, Utc::now(), ttl);
        let questions_json = serde_json::to_string(questions)
            .map_err(|e| StoreError::SerializationError(format!("Invalid questions: {}", e)))?;

        sqlx::query(
            "INSERT OR REPLACE INTO question_cache \
             (certification_id, questions, question_count, cached_at, expires_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(certification_id.value())
        .bind(questions_json)
        .bind(i64::from(question_count))
        .bind(format_datetime(&status.cached_at))
        .bind(format_datetime(&status.expires_at))
        .execute(&self.pool)
        .await?;

        // Re-read so the returned timestamps match what is stored
        self.fetch_cache_status(certification_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("cache entry {}", certification_id)))
    }

    async fn delete_cache(&self, certification_id: CertificationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM question_cache WHERE certification_id = ?")
            .bind(certification_id.value())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_all_cache_statuses(&self) -> Result<Vec<CacheStatus>, StoreError> {
        let rows = sqlx::query(
            "SELECT certification_id, question_count, cached_at, expires_at \
             FROM question_cache ORDER BY certification_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cache_status_from_row).collect()
    }

    async fn estimate(&self) -> Result<StorageEstimate, StoreError> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok(StorageEstimate {
            used_bytes: (page_count.max(0) as u64).saturating_mul(page_size.max(0) as u64),
        })
    }
}

// ============================================================================
// IOfflineStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IOfflineStore for SqliteOfflineStore {
    async fn enqueue(
        &self,
        kind: QueueItemKind,
        payload: serde_json::Value,
        correlation_key: Option<String>,
    ) -> anyhow::Result<QueueItemId> {
        Ok(self.enqueue_item(kind, payload, correlation_key).await?)
    }

    async fn get_pending(&self) -> anyhow::Result<Vec<SyncQueueItem>> {
        Ok(self.fetch_pending().await?)
    }

    async fn get_item(&self, id: &QueueItemId) -> anyhow::Result<Option<SyncQueueItem>> {
        Ok(self.fetch_item(id).await?)
    }

    async fn update(&self, item: &SyncQueueItem) -> anyhow::Result<()> {
        Ok(self.update_item(item).await?)
    }

    async fn remove(&self, id: &QueueItemId) -> anyhow::Result<()> {
        Ok(self.remove_item(id).await?)
    }

    async fn move_to_dead_letter(&self, id: &QueueItemId, error: &str) -> anyhow::Result<()> {
        Ok(self.dead_letter_item(id, error).await?)
    }

    async fn get_pending_count(&self) -> anyhow::Result<u64> {
        Ok(self.count_active().await?)
    }

    async fn recover_interrupted(&self) -> anyhow::Result<u64> {
        Ok(self.recover_in_progress().await?)
    }

    async fn list_dead_letters(&self) -> anyhow::Result<Vec<DeadLetterRecord>> {
        Ok(self.fetch_dead_letters().await?)
    }

    async fn dead_letter_count(&self) -> anyhow::Result<u64> {
        Ok(self.count_dead_letters().await?)
    }

    async fn requeue_dead_letter(&self, id: &QueueItemId) -> anyhow::Result<bool> {
        Ok(self.requeue(id).await?)
    }

    async fn discard_dead_letter(&self, id: &QueueItemId) -> anyhow::Result<bool> {
        Ok(self.discard(id).await?)
    }

    async fn get_cache_status(
        &self,
        certification_id: CertificationId,
    ) -> anyhow::Result<Option<CacheStatus>> {
        Ok(self.fetch_cache_status(certification_id).await?)
    }

    async fn get_cached_questions(
        &self,
        certification_id: CertificationId,
    ) -> anyhow::Result<Option<CachedQuestionSet>> {
        Ok(self.fetch_cached_questions(certification_id).await?)
    }

    async fn write_cache(
        &self,
        certification_id: CertificationId,
        questions: &[serde_json::Value],
        ttl: Duration,
    ) -> anyhow::Result<CacheStatus> {
        Ok(self.replace_cache(certification_id, questions, ttl).await?)
    }

    async fn clear_cache(&self, certification_id: CertificationId) -> anyhow::Result<bool> {
        Ok(self.delete_cache(certification_id).await?)
    }

    async fn list_all_cache_statuses(&self) -> anyhow::Result<Vec<CacheStatus>> {
        Ok(self.fetch_all_cache_statuses().await?)
    }

    async fn storage_estimate(&self) -> anyhow::Result<StorageEstimate> {
        Ok(self.estimate().await?)
    }
}
