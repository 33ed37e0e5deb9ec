//! Event bus for sync and cache lifecycle notifications
//!
//! The [`EventBus`] is an explicit instance shared through `Arc` by the
//! processor, the cache manager and the coordinator. Listeners are plain
//! synchronous callbacks; async consumers use [`EventBus::subscribe_channel`].
//!
//! Delivery is in-process, best effort and in subscription order. A listener
//! registered after an event was emitted never sees that event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use studysync_core::domain::{CertificationId, SyncQueueItem};

// ============================================================================
// SyncEvent
// ============================================================================

/// A lifecycle event emitted by the sync subsystem
///
/// Serializes as `{"event": <name>, ...fields}` with camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A pass started with a non-empty snapshot of the queue
    #[serde(rename = "sync:started", rename_all = "camelCase")]
    SyncStarted { pending_count: u64 },

    /// A pass finished (completely or stopped early)
    #[serde(rename = "sync:completed", rename_all = "camelCase")]
    SyncCompleted {
        total_processed: u32,
        successful: u32,
        failed: u32,
        dead_lettered: u32,
        already_synced: u32,
    },

    /// The server confirmed an item
    #[serde(rename = "sync:item:success", rename_all = "camelCase")]
    ItemSuccess {
        item: SyncQueueItem,
        already_synced: bool,
        server_response: serde_json::Value,
    },

    /// An item failed transiently and stays queued
    #[serde(rename = "sync:item:failed", rename_all = "camelCase")]
    ItemFailed {
        item: SyncQueueItem,
        error: String,
        next_retry_ms: u64,
    },

    /// An item left the queue for the dead-letter table
    #[serde(rename = "sync:item:dead-letter", rename_all = "camelCase")]
    ItemDeadLetter { item: SyncQueueItem, error: String },

    #[serde(rename = "online-status-changed", rename_all = "camelCase")]
    OnlineStatusChanged { is_online: bool },

    #[serde(rename = "cache:completed", rename_all = "camelCase")]
    CacheCompleted {
        certification_id: CertificationId,
        question_count: u32,
        cached_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },

    #[serde(rename = "cache:failed", rename_all = "camelCase")]
    CacheFailed {
        certification_id: CertificationId,
        error: String,
    },

    #[serde(rename = "cache:cleared", rename_all = "camelCase")]
    CacheCleared { certification_id: CertificationId },
}

impl SyncEvent {
    /// The wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SyncStarted { .. } => "sync:started",
            SyncEvent::SyncCompleted { .. } => "sync:completed",
            SyncEvent::ItemSuccess { .. } => "sync:item:success",
            SyncEvent::ItemFailed { .. } => "sync:item:failed",
            SyncEvent::ItemDeadLetter { .. } => "sync:item:dead-letter",
            SyncEvent::OnlineStatusChanged { .. } => "online-status-changed",
            SyncEvent::CacheCompleted { .. } => "cache:completed",
            SyncEvent::CacheFailed { .. } => "cache:failed",
            SyncEvent::CacheCleared { .. } => "cache:cleared",
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Publish/subscribe channel for [`SyncEvent`]s
#[derive(Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; it stays attached until the returned
    /// [`Subscription`] is dropped
    #[must_use = "dropping the Subscription detaches the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Forwards every subsequent event into an unbounded channel
    #[must_use = "dropping the Subscription detaches the listener"]
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            // Receiver gone: nothing left to deliver to
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Delivers an event to every current listener, in subscription order
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn emit(&self, event: SyncEvent) {
        let listeners: Vec<Listener> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(event = event.name(), "Event listener panicked");
            }
        }
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

/// Handle that keeps a listener attached to an [`EventBus`]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
