//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync core depends
//! on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IOfflineStore`] - Durable queue, dead letters and question cache
//! - [`IStudyApi`] - Server endpoints for submissions, questions and health
//! - [`IHostScheduler`] - Host-managed background and periodic sync

pub mod host_scheduler;
pub mod offline_store;
pub mod study_api;

pub use host_scheduler::IHostScheduler;
pub use offline_store::IOfflineStore;
pub use study_api::{ApiResponse, IStudyApi};
