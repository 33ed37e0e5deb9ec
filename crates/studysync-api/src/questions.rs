//! Offline question download
//!
//! `GET /api/offline/questions/{certificationId}?count=N` returns either an
//! object with a `questions` array or a bare array. Question documents are
//! kept as opaque JSON.

use reqwest::Method;
use studysync_core::domain::CertificationId;
use studysync_core::ports::ApiResponse;
use tracing::{debug, warn};

use crate::client::{parse_body, StudyApiClient};
use crate::ApiError;

/// Path of the question source for one certification
pub fn questions_path(certification_id: CertificationId) -> String {
    format!("/api/offline/questions/{}", certification_id)
}

/// Extracts the question list from a response body
pub fn parse_questions(body: serde_json::Value) -> Result<Vec<serde_json::Value>, ApiError> {
    match body {
        serde_json::Value::Array(questions) => Ok(questions),
        serde_json::Value::Object(mut map) => match map.remove("questions") {
            Some(serde_json::Value::Array(questions)) => Ok(questions),
            Some(other) => Err(ApiError::InvalidResponse(format!(
                "'questions' is not an array: {}",
                other
            ))),
            None => Err(ApiError::InvalidResponse(
                "response has no 'questions' field".to_string(),
            )),
        },
        other => Err(ApiError::InvalidResponse(format!(
            "unexpected question payload: {}",
            other
        ))),
    }
}

impl StudyApiClient {
    /// Fetches up to `count` questions for a certification
    pub async fn fetch_questions(
        &self,
        certification_id: CertificationId,
        count: u32,
    ) -> Result<Vec<serde_json::Value>, ApiError> {
        let path = questions_path(certification_id);
        debug!(%certification_id, count, "Fetching offline questions");

        let response = self
            .request(Method::GET, &path)
            .query(&[("count", count)])
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(ApiError::from_transport)?;
        let response = ApiResponse::new(status, parse_body(&text));

        if !response.is_success() {
            return Err(ApiError::Status {
                status,
                message: response.error_message(),
            });
        }

        let mut questions = parse_questions(response.body)?;
        let limit = usize::try_from(count).unwrap_or(usize::MAX);
        if questions.len() > limit {
            warn!(
                %certification_id,
                returned = questions.len(),
                requested = count,
                "Server returned more questions than requested, truncating"
            );
            questions.truncate(limit);
        }

        debug!(%certification_id, fetched = questions.len(), "Fetched offline questions");
        Ok(questions)
    }
}
