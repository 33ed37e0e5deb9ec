//! Sync command - Deliver queued items now
//!
//! Provides the `studysync sync` CLI command which:
//! 1. Loads configuration and opens the offline store
//! 2. Probes the study server; nothing is touched while it is unreachable
//! 3. Runs one queue pass and reports successes and dead letters
//!
//! Transient failures stay queued and are only logged.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::watch;
use tracing::{info, warn};

use studysync_api::client::StudyApiClient;
use studysync_core::ports::IOfflineStore;
use studysync_sync::{EventBus, ProcessorConfig, SyncEvent, SyncQueueProcessor};

use super::CommandContext;
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Reset items left in progress by a crashed process before syncing
    #[arg(long)]
    pub recover: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();
        let store = ctx.open_store(&config).await?;

        if self.recover {
            let recovered = store.recover_interrupted().await?;
            info!(recovered, "Recovered interrupted items");
            if recovered > 0 {
                formatter.info(&format!("Recovered {} interrupted item(s)", recovered));
            }
        }

        let api = StudyApiClient::from_config(&config.api)
            .context("Failed to create study API client")?;

        if let Err(e) = api.ping().await {
            warn!(error = %e, "Study server unreachable");
            let pending = store.get_pending_count().await?;
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "online": false,
                    "pendingCount": pending,
                    "result": null,
                }));
            } else {
                formatter.warn(&format!(
                    "Study server unreachable ({}), {} item(s) left queued",
                    e, pending
                ));
            }
            return Ok(());
        }

        let events = Arc::new(EventBus::new());
        let (subscription, mut rx) = events.subscribe_channel();
        let (_online, online_rx) = watch::channel(true);

        let processor = SyncQueueProcessor::new(
            Arc::clone(&store),
            Arc::new(api),
            Arc::clone(&events),
            online_rx,
            ProcessorConfig::from_config(&config.sync),
        );

        let result = processor.process_queue().await?;
        drop(subscription);

        let mut emitted = Vec::new();
        while let Ok(event) = rx.try_recv() {
            emitted.push(event);
        }

        let pending = store.get_pending_count().await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "online": true,
                "pendingCount": pending,
                "result": result,
                "events": emitted,
            }));
            return Ok(());
        }

        for event in &emitted {
            print_item_event(&*formatter, event);
        }

        match result {
            Some(result) if result.total_processed == 0 && result.deferred > 0 => {
                formatter.info(&format!(
                    "{} item(s) waiting for their retry backoff",
                    result.deferred
                ));
            }
            Some(result) if result.total_processed == 0 && !result.stopped_early => {
                formatter.success("Queue is empty, nothing to sync");
            }
            Some(result) => {
                formatter.success(&format!(
                    "Sync finished in {} ms",
                    result.duration_ms
                ));
                formatter.field("Processed", &result.total_processed.to_string());
                formatter.field("Successful", &result.successful.to_string());
                formatter.field("Already synced", &result.already_synced.to_string());
                formatter.field("Failed", &result.failed.to_string());
                formatter.field("Dead-lettered", &result.dead_lettered.to_string());
                formatter.field("Deferred", &result.deferred.to_string());
                if result.stopped_early {
                    formatter.warn("Pass stopped early, remaining items stay queued");
                }
            }
            None => formatter.warn("Another sync pass is already running"),
        }
        formatter.field("Pending", &pending.to_string());

        Ok(())
    }
}

fn print_item_event(formatter: &dyn OutputFormatter, event: &SyncEvent) {
    match event {
        SyncEvent::ItemSuccess {
            item,
            already_synced,
            ..
        } => {
            let note = if *already_synced { " (already synced)" } else { "" };
            formatter.success(&format!("Synced {} {}{}", item.kind, item.id, note));
        }
        SyncEvent::ItemDeadLetter { item, error } => formatter.error(&format!(
            "{} {} moved to dead letter: {}",
            item.kind, item.id, error
        )),
        _ => {}
    }
}
