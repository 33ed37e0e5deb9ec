//! Dead-letter command - Inspect and manage items that will not be retried
//!
//! Provides the `studysync dead-letter` CLI command which:
//! 1. Lists dead-lettered items with their final error
//! 2. Requeues an item with a fresh retry budget
//! 3. Discards an item permanently

use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use studysync_core::domain::QueueItemId;
use studysync_core::ports::IOfflineStore;

use super::CommandContext;
use crate::output::format_time;

#[derive(Debug, Subcommand)]
pub enum DeadLetterCommand {
    /// List dead-lettered items
    List,
    /// Put an item back in the queue with a fresh retry budget
    Requeue {
        /// Queue item id
        id: QueueItemId,
    },
    /// Delete an item permanently
    Discard {
        /// Queue item id
        id: QueueItemId,
    },
}

impl DeadLetterCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config();
        let store = ctx.open_store(&config).await?;

        match self {
            DeadLetterCommand::List => Self::execute_list(&*store, ctx).await,
            DeadLetterCommand::Requeue { id } => {
                let found = store.requeue_dead_letter(id).await?;
                info!(item_id = %id, found, "Requeue dead letter");
                report(ctx, "requeued", id, found);
                Ok(())
            }
            DeadLetterCommand::Discard { id } => {
                let found = store.discard_dead_letter(id).await?;
                info!(item_id = %id, found, "Discard dead letter");
                report(ctx, "discarded", id, found);
                Ok(())
            }
        }
    }

    async fn execute_list(store: &dyn IOfflineStore, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let records = store.list_dead_letters().await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::to_value(&records)?);
            return Ok(());
        }

        if records.is_empty() {
            formatter.success("No dead-lettered items");
            return Ok(());
        }

        formatter.success(&format!("{} dead-lettered item(s)", records.len()));
        for record in &records {
            formatter.info("");
            formatter.field("Id", &record.item.id.to_string());
            formatter.field("Type", record.item.kind.as_str());
            formatter.field("Retries", &record.item.retry_count.to_string());
            formatter.field("Queued", &format_time(&record.item.created_at));
            formatter.field("Dead-lettered", &format_time(&record.dead_lettered_at));
            formatter.field("Error", &record.error);
        }
        Ok(())
    }
}

fn report(ctx: &CommandContext, action: &str, id: &QueueItemId, found: bool) {
    let formatter = ctx.formatter();
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "id": id.to_string(),
            "action": action,
            "found": found,
        }));
    } else if found {
        formatter.success(&format!("Item {} {}", id, action));
    } else {
        formatter.error(&format!("No dead-lettered item with id {}", id));
    }
}
