//! Cache command - Manage the offline question cache
//!
//! Provides the `studysync cache` CLI command which:
//! 1. Downloads questions for a certification
//! 2. Clears the cached set of a certification
//! 3. Shows the status of every cached certification

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use studysync_api::client::StudyApiClient;
use studysync_core::domain::CertificationId;
use studysync_sync::{CacheManager, CacheSettings, EventBus};

use super::CommandContext;
use crate::output::format_time;

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Download questions for offline practice
    Fetch {
        /// Certification id
        certification: CertificationId,
        /// Number of questions (defaults to cache.default_question_count)
        #[arg(long)]
        count: Option<u32>,
    },
    /// Remove the cached questions of a certification
    Clear {
        /// Certification id
        certification: CertificationId,
    },
    /// Show cached certifications
    Status,
}

impl CacheCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();
        let store = ctx.open_store(&config).await?;
        let api = StudyApiClient::from_config(&config.api)
            .context("Failed to create study API client")?;

        let manager = CacheManager::new(
            store,
            Arc::new(api),
            Arc::new(EventBus::new()),
            CacheSettings::from_config(&config.cache),
        );

        match self {
            CacheCommand::Fetch {
                certification,
                count,
            } => {
                let status = manager
                    .cache_questions_for_certification(*certification, *count)
                    .await?;
                if ctx.is_json() {
                    formatter.print_json(&serde_json::to_value(&status)?);
                } else {
                    formatter.success(&format!(
                        "Cached {} questions for certification {}",
                        status.question_count, status.certification_id
                    ));
                    formatter.field("Expires", &format_time(&status.expires_at));
                }
            }
            CacheCommand::Clear { certification } => {
                let removed = manager.clear_cache(*certification).await?;
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "certificationId": certification,
                        "removed": removed,
                    }));
                } else if removed {
                    formatter.success(&format!("Cleared cache for certification {}", certification));
                } else {
                    formatter.info(&format!("Nothing cached for certification {}", certification));
                }
            }
            CacheCommand::Status => {
                let statuses = manager.get_all_cache_status().await?;
                if ctx.is_json() {
                    let json: Vec<serde_json::Value> = statuses
                        .iter()
                        .map(|status| {
                            let mut value = serde_json::to_value(status).unwrap_or_default();
                            value["isExpired"] = serde_json::Value::Bool(status.is_expired());
                            value
                        })
                        .collect();
                    formatter.print_json(&serde_json::Value::Array(json));
                } else if statuses.is_empty() {
                    formatter.info("No cached question sets");
                } else {
                    for status in &statuses {
                        let state = if status.is_expired() { "expired" } else { "fresh" };
                        formatter.success(&format!(
                            "Certification {}: {} questions ({})",
                            status.certification_id, status.question_count, state
                        ));
                        formatter.field("Cached", &format_time(&status.cached_at));
                        formatter.field("Expires", &format_time(&status.expires_at));
                    }
                }
            }
        }
        Ok(())
    }
}
