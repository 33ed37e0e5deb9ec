//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! such as identifier parsing, unknown queue item kinds and invalid
//! status transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A stored or user-supplied queue item kind is not one of the known kinds
    #[error("Unknown queue item kind: {0}")]
    UnknownKind(String),

    /// A stored queue item status is not one of the known statuses
    #[error("Unknown queue item status: {0}")]
    UnknownStatus(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Queue payloads must be JSON objects so sync metadata can be merged in
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
