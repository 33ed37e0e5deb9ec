//! Sync queue domain entities
//!
//! A `SyncQueueItem` records one user action taken while offline. It lives in
//! the active queue until the server confirms it, or until it is moved to the
//! dead-letter table as a `DeadLetterRecord`.
//!
//! ## Status Machine
//!
//! ```text
//!   enqueue ──► Pending ──attempt──► InProgress ──2xx──► (removed)
//!                  ▲                     │  │
//!                  └──── transient ──────┘  └── permanent / exhausted ──► (dead letter)
//!                                        │
//!   Failed ◄──── process died mid-attempt┘
//!     │
//!     └──attempt──► InProgress
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::QueueItemId;

/// Number of transient failures after which an item is dead-lettered
pub const MAX_RETRIES: u32 = 5;

// ============================================================================
// QueueItemKind
// ============================================================================

/// The closed set of actions that can be queued for sync
///
/// Each kind maps to exactly one server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    /// A completed practice or certification exam
    ExamSubmission,
    /// A timed study session
    StudySession,
    /// The result of a drill run
    DrillResult,
    /// A spaced-repetition rating of one flashcard
    FlashcardRating,
}

impl QueueItemKind {
    /// All kinds, in declaration order
    pub const ALL: [QueueItemKind; 4] = [
        QueueItemKind::ExamSubmission,
        QueueItemKind::StudySession,
        QueueItemKind::DrillResult,
        QueueItemKind::FlashcardRating,
    ];

    /// Server endpoint path that accepts this kind of item
    pub fn endpoint(&self) -> &'static str {
        match self {
            QueueItemKind::ExamSubmission => "/api/exams/offline-submit",
            QueueItemKind::StudySession => "/api/study/sessions/offline-submit",
            QueueItemKind::DrillResult => "/api/drills/offline-submit",
            QueueItemKind::FlashcardRating => "/api/study/flashcards/offline-rate",
        }
    }

    /// Stable snake_case name used in storage and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemKind::ExamSubmission => "exam_submission",
            QueueItemKind::StudySession => "study_session",
            QueueItemKind::DrillResult => "drill_result",
            QueueItemKind::FlashcardRating => "flashcard_rating",
        }
    }
}

impl fmt::Display for QueueItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::UnknownKind(s.to_string()))
    }
}

// ============================================================================
// QueueItemStatus
// ============================================================================

/// Status of an item that is still in the active queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting for the next pass
    #[default]
    Pending,
    /// Currently being sent to the server
    InProgress,
    /// Interrupted by a process exit during an attempt
    Failed,
}

impl QueueItemStatus {
    /// Returns true if the item should be picked up by the next pass
    pub fn is_eligible(&self) -> bool {
        matches!(self, QueueItemStatus::Pending | QueueItemStatus::Failed)
    }

    /// Returns the status name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::InProgress => "in_progress",
            QueueItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueItemStatus::Pending),
            "in_progress" => Ok(QueueItemStatus::InProgress),
            "failed" => Ok(QueueItemStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// SyncQueueItem
// ============================================================================

/// One queued user action awaiting confirmation from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: QueueItemId,
    #[serde(rename = "type")]
    pub kind: QueueItemKind,
    /// Business request body, always a JSON object
    pub payload: serde_json::Value,
    /// Operation-local key used by the server for deduplication
    pub correlation_key: Option<String>,
    pub status: QueueItemStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SyncQueueItem {
    /// Creates a new pending item
    ///
    /// The payload must be a JSON object; the sync metadata fields are merged
    /// into it when the item is dispatched.
    pub fn new(
        kind: QueueItemKind,
        payload: serde_json::Value,
        correlation_key: Option<String>,
    ) -> Result<Self, DomainError> {
        if !payload.is_object() {
            return Err(DomainError::InvalidPayload(format!(
                "{kind} payload must be a JSON object"
            )));
        }

        Ok(Self {
            id: QueueItemId::new(),
            kind,
            payload,
            correlation_key,
            status: QueueItemStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
            created_at: Utc::now(),
        })
    }

    /// Returns true once the retry budget is spent
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Returns true when the item may be attempted at `now`
    ///
    /// Items that never failed are always due. A failed item waits `backoff`
    /// after its last attempt.
    pub fn is_due(&self, now: DateTime<Utc>, backoff: std::time::Duration) -> bool {
        if self.retry_count == 0 {
            return true;
        }
        let Some(last_attempt) = self.last_attempt_at else {
            return true;
        };
        match chrono::Duration::from_std(backoff) {
            Ok(backoff) => last_attempt + backoff <= now,
            Err(_) => false,
        }
    }

    /// Marks the start of a delivery attempt
    pub fn mark_in_progress(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.is_eligible() {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: QueueItemStatus::InProgress.to_string(),
            });
        }
        self.status = QueueItemStatus::InProgress;
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// Records a transient failure and puts the item back in line
    pub fn record_transient_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.status = QueueItemStatus::Pending;
    }

    /// Marks an attempt that never finished because the process exited
    pub fn mark_interrupted(&mut self) -> Result<(), DomainError> {
        if self.status != QueueItemStatus::InProgress {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: QueueItemStatus::Failed.to_string(),
            });
        }
        self.status = QueueItemStatus::Failed;
        Ok(())
    }

    /// Builds the request body sent to the server
    ///
    /// The payload is extended with `syncQueueItemId` and `clientTimestamp`
    /// (the item's creation time).
    pub fn request_body(&self) -> serde_json::Value {
        let mut body = self.payload.clone();
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "syncQueueItemId".to_string(),
                serde_json::Value::String(self.id.to_string()),
            );
            map.insert(
                "clientTimestamp".to_string(),
                serde_json::Value::String(self.created_at.to_rfc3339()),
            );
        }
        body
    }
}

// ============================================================================
// DeadLetterRecord
// ============================================================================

/// An item that will never be retried automatically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    /// The item as it was when it left the active queue
    pub item: SyncQueueItem,
    /// Terminal error message
    pub error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(item: SyncQueueItem, error: impl Into<String>) -> Self {
        Self {
            item,
            error: error.into(),
            dead_lettered_at: Utc::now(),
        }
    }

    /// Converts the record back into a fresh pending item
    ///
    /// The identifier and `created_at` are preserved so the item keeps its
    /// place in FIFO order.
    pub fn into_requeued(self) -> SyncQueueItem {
        let mut item = self.item;
        item.status = QueueItemStatus::Pending;
        item.retry_count = 0;
        item.last_error = None;
        item.last_attempt_at = None;
        item
    }
}
