//! SQLite pool for the offline queue, dead letters and question cache
//!
//! Opening a pool always applies the schema. The schema is idempotent
//! (`CREATE ... IF NOT EXISTS`), so reopening an existing database is safe.

use std::path::Path;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use studysync_core::config::StorageConfig;

use crate::StoreError;

/// Shared connection pool for the offline store
///
/// File databases run in WAL mode with `synchronous = NORMAL`, so a queued
/// item survives an application crash once `enqueue` returns. The CLI and
/// the daemon may open the same file; writers wait up to 5 seconds for the
/// lock.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the database file at `db_path`
    ///
    /// Missing parent directories are created.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Offline store opened");

        Ok(Self { pool })
    }

    /// Opens the database configured in the `storage` section
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::new(&config.database_path).await
    }

    /// Opens a throwaway in-memory database
    ///
    /// An in-memory database lives and dies with its connection, so the pool
    /// holds exactly one and never recycles it.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory offline store opened");

        Ok(Self { pool })
    }

    /// Underlying pool handed to `SqliteOfflineStore`
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection, waiting for in-flight queries
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Applies the queue, dead-letter and cache tables
    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        let migration_sql = include_str!("migrations/20260301_offline_queue.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                StoreError::MigrationFailed(format!("Failed to apply offline schema: {}", e))
            })?;

        tracing::debug!("Offline schema applied");
        Ok(())
    }
}
