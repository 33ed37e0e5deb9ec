//! Host scheduler port
//!
//! The host environment may be able to wake the application for a
//! background sync after connectivity returns, and may offer a periodic
//! wake-up. Neither is guaranteed; callers must keep their own fallbacks.

use std::time::Duration;

/// Port trait for host-managed background execution
#[async_trait::async_trait]
pub trait IHostScheduler: Send + Sync {
    /// Asks the host to run a one-off sync once the device is online
    ///
    /// Best effort. An error only means the request was not registered.
    async fn request_background_sync(&self, tag: &str) -> anyhow::Result<()>;

    /// Asks the host to invoke the periodic callback every `min_interval`
    ///
    /// Returns `Ok(true)` when the host accepted the registration.
    async fn register_periodic_sync(&self, tag: &str, min_interval: Duration)
        -> anyhow::Result<bool>;

    /// Cancels a periodic registration made earlier
    async fn unregister_periodic_sync(&self, tag: &str) -> anyhow::Result<()>;
}
