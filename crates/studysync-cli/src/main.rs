//! StudySync CLI - Command-line interface for the offline sync subsystem
//!
//! Provides commands for:
//! - Queueing submissions for later delivery
//! - Viewing queue, dead-letter and cache status
//! - Running a sync pass on demand
//! - Managing dead-lettered items and the question cache
//! - Viewing and validating configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    cache::CacheCommand, completions::CompletionsCommand, config::ConfigCommand,
    dead_letter::DeadLetterCommand, enqueue::EnqueueCommand, status::StatusCommand,
    sync::SyncCommand, CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "studysync", version, about = "Offline-first sync for StudySync")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Queue a submission for delivery
    Enqueue(EnqueueCommand),
    /// Show queue, dead-letter and cache status
    Status(StatusCommand),
    /// Run one sync pass now
    Sync(SyncCommand),
    /// Inspect and manage dead-lettered items
    #[command(subcommand)]
    DeadLetter(DeadLetterCommand),
    /// Manage the offline question cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(format, cli.config.as_deref());

    match cli.command {
        Commands::Enqueue(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::DeadLetter(cmd) => cmd.execute(&ctx).await,
        Commands::Cache(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}
