//! Status command - Display queue, dead-letter and cache status
//!
//! Provides the `studysync status` CLI command which shows:
//! 1. Pending queue items (oldest first) with retry counts and last errors
//! 2. Dead-letter count
//! 3. Cached question sets with expiry
//! 4. Local storage usage

use anyhow::Result;
use clap::Args;

use studysync_core::ports::IOfflineStore;

use super::CommandContext;
use crate::output::format_time;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// List every pending item
    #[arg(long)]
    pub items: bool,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();
        let store = ctx.open_store(&config).await?;

        let pending = store.get_pending().await?;
        let pending_count = store.get_pending_count().await?;
        let dead_letters = store.dead_letter_count().await?;
        let caches = store.list_all_cache_statuses().await?;
        let storage = store.storage_estimate().await?;

        if ctx.is_json() {
            let caches: Vec<serde_json::Value> = caches
                .iter()
                .map(|status| {
                    serde_json::json!({
                        "certificationId": status.certification_id,
                        "questionCount": status.question_count,
                        "cachedAt": status.cached_at,
                        "expiresAt": status.expires_at,
                        "isExpired": status.is_expired(),
                    })
                })
                .collect();
            let mut json = serde_json::json!({
                "pendingCount": pending_count,
                "deadLetterCount": dead_letters,
                "caches": caches,
                "storage": storage,
            });
            if self.items {
                json["items"] = serde_json::to_value(&pending)?;
            }
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success("StudySync Status");
        formatter.info("");
        formatter.field("Pending items", &pending_count.to_string());
        formatter.field("Dead letters", &dead_letters.to_string());
        formatter.field("Storage used", &format_bytes(storage.used_bytes));

        if self.items && !pending.is_empty() {
            formatter.info("");
            formatter.info("Queue:");
            for item in &pending {
                let error = item
                    .last_error
                    .as_deref()
                    .map(|e| format!(" - {e}"))
                    .unwrap_or_default();
                formatter.info(&format!(
                    "  {} {:<17} retries={} queued {}{}",
                    item.id,
                    item.kind.as_str(),
                    item.retry_count,
                    format_time(&item.created_at),
                    error
                ));
            }
        }

        formatter.info("");
        if caches.is_empty() {
            formatter.info("Question cache: empty");
        } else {
            formatter.info("Question cache:");
            for status in &caches {
                let state = if status.is_expired() { "expired" } else { "fresh" };
                formatter.info(&format!(
                    "  certification {:<6} {:>5} questions  {} (expires {})",
                    status.certification_id,
                    status.question_count,
                    state,
                    format_time(&status.expires_at)
                ));
            }
        }
        if dead_letters > 0 {
            formatter.warn(&format!(
                "{} item(s) need attention, see 'studysync dead-letter list'",
                dead_letters
            ));
        }

        Ok(())
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
