//! StudySync Core - Domain types and ports for offline-first synchronization
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncQueueItem`, `DeadLetterRecord`, `CacheStatus`, `ResponseMap`
//! - **Port definitions** - Traits for adapters: `IOfflineStore`, `IStudyApi`, `IHostScheduler`
//! - **Configuration** - YAML-backed typed configuration with validation
//!
//! # Architecture
//!
//! The domain module contains plain data types and their invariants with no
//! I/O. Ports define the trait interfaces that the store, API and sync crates
//! implement or consume.

pub mod config;
pub mod domain;
pub mod ports;
