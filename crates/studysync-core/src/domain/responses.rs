//! Exam response containers
//!
//! `ResponseMap` keeps answers keyed by question id in the order questions
//! were first answered. It is persisted and sent over the wire as an array of
//! `{questionId, answer}` pairs so that ordering survives serialization.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::DomainError;

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub question_id: String,
    pub answer: serde_json::Value,
}

/// Ordered map from question id to answer with unique keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMap {
    entries: Vec<ResponseEntry>,
}

impl ResponseMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an answer, replacing any earlier answer in place
    ///
    /// Returns the previous answer if the question was already answered.
    pub fn insert(
        &mut self,
        question_id: impl Into<String>,
        answer: serde_json::Value,
    ) -> Option<serde_json::Value> {
        let question_id = question_id.into();
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.question_id == question_id)
        {
            Some(entry) => Some(std::mem::replace(&mut entry.answer, answer)),
            None => {
                self.entries.push(ResponseEntry {
                    question_id,
                    answer,
                });
                None
            }
        }
    }

    pub fn get(&self, question_id: &str) -> Option<&serde_json::Value> {
        self.entries
            .iter()
            .find(|entry| entry.question_id == question_id)
            .map(|entry| &entry.answer)
    }

    pub fn remove(&mut self, question_id: &str) -> Option<serde_json::Value> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.question_id == question_id)?;
        Some(self.entries.remove(index).answer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in first-answered order
    pub fn iter(&self) -> impl Iterator<Item = &ResponseEntry> {
        self.entries.iter()
    }
}

impl Serialize for ResponseMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResponseMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<ResponseEntry>::deserialize(deserializer)?;
        let mut map = ResponseMap::new();
        for entry in entries {
            if map.get(&entry.question_id).is_some() {
                return Err(D::Error::custom(format!(
                    "duplicate questionId {}",
                    entry.question_id
                )));
            }
            map.entries.push(entry);
        }
        Ok(map)
    }
}

/// Typed builder for the exam-submission payload
///
/// `localExamId` is generated on the device and doubles as the correlation
/// key the server uses to detect a repeated submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSubmission {
    pub local_exam_id: String,
    pub certification_id: i64,
    pub responses: ResponseMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent_seconds: Option<u64>,
    #[serde(default = "chrono::Utc::now")]
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl ExamSubmission {
    pub fn new(local_exam_id: impl Into<String>, certification_id: i64) -> Self {
        Self {
            local_exam_id: local_exam_id.into(),
            certification_id,
            responses: ResponseMap::new(),
            time_spent_seconds: None,
            completed_at: chrono::Utc::now(),
        }
    }

    /// Adds or replaces the answer to one question
    pub fn answer(mut self, question_id: impl Into<String>, answer: serde_json::Value) -> Self {
        self.responses.insert(question_id, answer);
        self
    }

    pub fn time_spent_seconds(mut self, seconds: u64) -> Self {
        self.time_spent_seconds = Some(seconds);
        self
    }

    /// The correlation key for this submission
    pub fn correlation_key(&self) -> &str {
        &self.local_exam_id
    }

    /// Converts the submission into a queue payload
    pub fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        if self.local_exam_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "localExamId must not be empty".to_string(),
            ));
        }
        serde_json::to_value(self).map_err(|e| DomainError::InvalidPayload(e.to_string()))
    }
}
