//! CLI subcommands
//!
//! Each command exposes `execute(&CommandContext)`. Commands that touch the
//! queue open the SQLite store named in the configuration.

pub mod cache;
pub mod completions;
pub mod config;
pub mod dead_letter;
pub mod enqueue;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use studysync_core::config::Config;
use studysync_core::ports::IOfflineStore;
use studysync_store::{DatabasePool, SqliteOfflineStore};
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Options shared by every command
pub struct CommandContext {
    pub format: OutputFormat,
    pub config_path: PathBuf,
}

impl CommandContext {
    pub fn new(format: OutputFormat, config: Option<&str>) -> Self {
        let config_path = config.map_or_else(Config::default_path, PathBuf::from);
        Self {
            format,
            config_path,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.is_json())
    }

    /// Loads the configuration, falling back to defaults when missing
    pub fn load_config(&self) -> Config {
        Config::load_or_default(&self.config_path)
    }

    /// Opens the queue database named in the configuration
    pub async fn open_store(&self, config: &Config) -> Result<Arc<dyn IOfflineStore>> {
        debug!(path = %config.storage.database_path.display(), "Opening offline store");
        let pool = DatabasePool::from_config(&config.storage)
            .await
            .context("Failed to open offline store")?;
        Ok(Arc::new(SqliteOfflineStore::new(pool.pool().clone())))
    }
}
