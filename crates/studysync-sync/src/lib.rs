//! StudySync Sync - Offline-first synchronization core
//!
//! Provides:
//! - A FIFO sync queue processor with bounded retries and dead-lettering
//! - Exponential backoff with jitter
//! - A question cache manager with per-certification refresh exclusion
//! - A connectivity and lifecycle coordinator for host-driven triggers
//! - An explicit, injectable event bus
//!
//! ## Modules
//!
//! - [`events`] - `SyncEvent` and the `EventBus`
//! - [`backoff`] - Retry delay policy
//! - [`processor`] - Queue draining and response classification
//! - [`cache_manager`] - Question cache population and eviction
//! - [`coordinator`] - Online/offline state, host callbacks, periodic refresh
//! - [`host`] - Host scheduler adapters
//! - [`metrics`] - Prometheus metrics

pub mod backoff;
pub mod cache_manager;
pub mod coordinator;
pub mod events;
pub mod host;
pub mod metrics;
pub mod processor;

use studysync_core::domain::CertificationId;
use thiserror::Error;

pub use cache_manager::{CacheManager, CacheSettings, RefreshSummary};
pub use coordinator::{CoordinatorSettings, SyncContext, SyncCoordinator};
pub use events::{EventBus, Subscription, SyncEvent};
pub use processor::{
    classify_response, DispatchOutcome, ProcessorConfig, SyncQueueProcessor, SyncResult,
};

/// Errors returned by the question cache manager
#[derive(Debug, Error)]
pub enum CacheManagerError {
    /// Another refresh for the same certification has not finished yet
    #[error("Cache refresh already in progress for certification {0}")]
    RefreshInProgress(CertificationId),

    /// The question source could not be reached or returned an error
    #[error("Failed to fetch questions: {0:#}")]
    Fetch(anyhow::Error),

    /// The questions could not be written to the local store
    #[error("Failed to store questions: {0:#}")]
    Store(anyhow::Error),
}
