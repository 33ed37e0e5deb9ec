//! StudySync API - HTTP client for the study server
//!
//! Provides an async client for:
//! - Offline submission endpoints replayed by the sync queue
//! - The offline question source used to populate the question cache
//! - A lightweight health probe used for connectivity detection
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and raw submission calls
//! - [`questions`] - Question download and response parsing
//! - [`provider`] - `IStudyApi` port implementation

pub mod client;
pub mod provider;
pub mod questions;

use thiserror::Error;

/// Errors that can occur when communicating with the study server
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The server answered with a non-success status where one was required
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message extracted from the body, or the status line
        message: String,
    },

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The client could not be built from the given settings
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Classifies a reqwest error, separating timeouts from other failures
    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else {
            ApiError::NetworkError(e)
        }
    }
}
