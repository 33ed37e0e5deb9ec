//! Study API port (driven/secondary port)
//!
//! This module defines the interface to the remote study server: the offline
//! submission endpoints drained by the sync queue, the question source used
//! by the cache manager, and a health probe.
//!
//! ## Design Notes
//!
//! - `submit_offline` returns `Ok` for every HTTP response, including
//!   non-2xx ones. Classification of status codes belongs to the sync core.
//!   An `Err` means no response was received (network error, timeout).
//! - Uses `anyhow::Result` because transport errors are adapter-specific.

use serde::{Deserialize, Serialize};

use crate::domain::{CertificationId, QueueItemKind};

/// A raw HTTP response from a submission endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body parsed as JSON, `Null` when empty or not JSON
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx status codes
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error message carried by a non-2xx body
    ///
    /// Looks at `message`, then `error`, and falls back to `HTTP <code>`.
    pub fn error_message(&self) -> String {
        ["message", "error"]
            .iter()
            .find_map(|field| self.body.get(field).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// Port trait for the remote study server
#[async_trait::async_trait]
pub trait IStudyApi: Send + Sync {
    /// POSTs a queued item's body to the endpoint for its kind
    async fn submit_offline(
        &self,
        kind: QueueItemKind,
        body: &serde_json::Value,
    ) -> anyhow::Result<ApiResponse>;

    /// Fetches up to `count` questions for a certification
    async fn fetch_questions(
        &self,
        certification_id: CertificationId,
        count: u32,
    ) -> anyhow::Result<Vec<serde_json::Value>>;

    /// Checks that the server is reachable
    ///
    /// Any HTTP response counts as reachable.
    async fn ping(&self) -> anyhow::Result<()>;
}
