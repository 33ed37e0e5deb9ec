//! StudySync Store - Durable local state
//!
//! SQLite-based storage for:
//! - The FIFO sync queue of actions recorded while offline
//! - Dead-lettered items that will not be retried automatically
//! - Per-certification question caches with expiry metadata
//!
//! ## Architecture
//!
//! This crate implements the `IOfflineStore` port from `studysync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteOfflineStore`] - Full `IOfflineStore` implementation
//! - [`StoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use studysync_store::{DatabasePool, SqliteOfflineStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/studysync/studysync.db")).await?;
//! let store = SqliteOfflineStore::new(pool.pool().clone());
//! // Use store as IOfflineStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteOfflineStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The referenced queue item does not exist
    #[error("Queue item not found: {0}")]
    NotFound(String),

    /// The caller passed data the domain rejects
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

impl From<studysync_core::domain::DomainError> for StoreError {
    fn from(e: studysync_core::domain::DomainError) -> Self {
        StoreError::InvalidInput(e.to_string())
    }
}
