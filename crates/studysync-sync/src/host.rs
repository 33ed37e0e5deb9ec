//! Host scheduler adapters
//!
//! A host that cannot wake the process in the background is represented by
//! [`NoHostScheduler`]: background sync requests are accepted and ignored,
//! periodic registration is declined so the coordinator falls back to its
//! local timer.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use studysync_core::ports::IHostScheduler;

/// Scheduler for hosts without background execution support
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHostScheduler;

#[async_trait]
impl IHostScheduler for NoHostScheduler {
    async fn request_background_sync(&self, tag: &str) -> anyhow::Result<()> {
        debug!(tag, "Background sync not supported by host, relying on foreground triggers");
        Ok(())
    }

    async fn register_periodic_sync(&self, tag: &str, interval: Duration) -> anyhow::Result<bool> {
        debug!(tag, interval_secs = interval.as_secs(), "Periodic sync not supported by host");
        Ok(false)
    }

    async fn unregister_periodic_sync(&self, _tag: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
