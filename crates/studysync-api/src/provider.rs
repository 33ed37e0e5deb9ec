//! IStudyApi implementation for the study server client
//!
//! Delegates to [`StudyApiClient`] and converts [`ApiError`] into
//! `anyhow::Error` at the port boundary. The original `ApiError` stays
//! reachable through `downcast_ref`.

use anyhow::Result;
use studysync_core::domain::{CertificationId, QueueItemKind};
use studysync_core::ports::{ApiResponse, IStudyApi};

use crate::client::StudyApiClient;

#[async_trait::async_trait]
impl IStudyApi for StudyApiClient {
    async fn submit_offline(
        &self,
        kind: QueueItemKind,
        body: &serde_json::Value,
    ) -> Result<ApiResponse> {
        Ok(self.submit(kind, body).await?)
    }

    async fn fetch_questions(
        &self,
        certification_id: CertificationId,
        count: u32,
    ) -> Result<Vec<serde_json::Value>> {
        Ok(StudyApiClient::fetch_questions(self, certification_id, count).await?)
    }

    async fn ping(&self) -> Result<()> {
        Ok(StudyApiClient::ping(self).await?)
    }
}
