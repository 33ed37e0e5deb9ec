//! Enqueue command - Queue a submission for later delivery
//!
//! Provides the `studysync enqueue` CLI command which persists one item in
//! the offline queue. The item is delivered by the next sync pass (daemon
//! or `studysync sync`). A storage failure is a hard error.
//!
//! Exam submissions are checked against the `ExamSubmission` shape first:
//! answers must carry unique question ids and `localExamId` must be set.
//! The local exam id becomes the correlation key unless one is given.

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use studysync_core::domain::{ExamSubmission, QueueItemKind};
use studysync_core::ports::IOfflineStore;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct EnqueueCommand {
    /// Item kind: exam_submission, study_session, drill_result, flashcard_rating
    pub kind: QueueItemKind,

    /// JSON object sent to the server
    #[arg(long)]
    pub payload: String,

    /// Client-side key used to recognise duplicates (e.g. the local exam id)
    #[arg(long)]
    pub correlation_key: Option<String>,
}

impl EnqueueCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();

        let (payload, correlation_key) =
            prepare_payload(self.kind, &self.payload, self.correlation_key.clone())?;

        let config = ctx.load_config();
        let store = ctx.open_store(&config).await?;

        let id = store
            .enqueue(self.kind, payload, correlation_key)
            .await
            .context("Failed to persist queue item")?;
        let pending = store.get_pending_count().await?;

        info!(item_id = %id, kind = %self.kind, "Item queued");

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "id": id.to_string(),
                "type": self.kind.as_str(),
                "endpoint": self.kind.endpoint(),
                "pendingCount": pending,
            }));
        } else {
            formatter.success(&format!("Queued {} {}", self.kind, id));
            formatter.field("Endpoint", self.kind.endpoint());
            formatter.field("Pending items", &pending.to_string());
        }
        Ok(())
    }
}

/// Parses the raw payload and fills in the correlation key
fn prepare_payload(
    kind: QueueItemKind,
    raw: &str,
    correlation_key: Option<String>,
) -> Result<(serde_json::Value, Option<String>)> {
    let mut payload: serde_json::Value =
        serde_json::from_str(raw).context("Payload is not valid JSON")?;
    if !payload.is_object() {
        bail!("Payload must be a JSON object");
    }
    if kind != QueueItemKind::ExamSubmission {
        return Ok((payload, correlation_key));
    }

    let submission: ExamSubmission = serde_json::from_value(payload.clone())
        .context("Payload is not a valid exam submission")?;
    let normalized = submission.to_payload()?;
    if let (Some(target), Some(fields)) = (payload.as_object_mut(), normalized.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }

    let correlation_key =
        correlation_key.or_else(|| Some(submission.correlation_key().to_string()));
    Ok((payload, correlation_key))
}
