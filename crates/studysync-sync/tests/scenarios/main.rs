//! Scenario tests for the sync processor, cache manager and coordinator
//!
//! Each test runs against a wiremock study server and an in-memory store.

mod test_cache;
mod test_coordinator;
mod test_processor;
