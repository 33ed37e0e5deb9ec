//! Question cache entities
//!
//! At most one cache entry exists per certification. Entries carry their own
//! expiry; an expired entry stays readable and is only flagged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::CertificationId;

/// Metadata for the cached question set of one certification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub certification_id: CertificationId,
    pub question_count: u32,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheStatus {
    /// Builds the status of an entry written at `cached_at` with the given TTL
    pub fn new(
        certification_id: CertificationId,
        question_count: u32,
        cached_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            certification_id,
            question_count,
            cached_at,
            expires_at: cached_at + ttl,
        }
    }

    /// Returns true if the entry is past its expiry now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the entry is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A cached question set as handed to exam-taking flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedQuestionSet {
    pub status: CacheStatus,
    /// Question documents exactly as the server returned them
    pub questions: Vec<serde_json::Value>,
}

/// Approximate local storage usage, for display only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEstimate {
    pub used_bytes: u64,
}
