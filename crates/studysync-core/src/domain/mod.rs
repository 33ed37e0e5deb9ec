//! Domain entities and business logic
//!
//! This module contains the core domain types for StudySync:
//! - Newtypes for queue item and certification identifiers
//! - Sync queue items, their kinds and statuses, dead-letter records
//! - Question cache status and cached question sets
//! - The ordered response map used by exam submissions
//! - Domain-specific error types

pub mod cache;
pub mod errors;
pub mod newtypes;
pub mod queue_item;
pub mod responses;

// Re-export commonly used types
pub use cache::{CacheStatus, CachedQuestionSet};
pub use errors::DomainError;
pub use newtypes::{CertificationId, QueueItemId};
pub use queue_item::{
    DeadLetterRecord, QueueItemKind, QueueItemStatus, SyncQueueItem, MAX_RETRIES,
};
pub use responses::{ExamSubmission, ResponseEntry, ResponseMap};
