//! Study server HTTP client
//!
//! Provides a typed HTTP client for the study server. Handles the bearer
//! token, per-request timeouts and endpoint construction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use studysync_api::client::StudyApiClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = StudyApiClient::new("https://study.example.com", Duration::from_secs(30))?
//!     .with_auth_token("token");
//! client.ping().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use studysync_core::config::ApiConfig;
use studysync_core::domain::QueueItemKind;
use studysync_core::ports::ApiResponse;
use tracing::debug;

use crate::ApiError;

/// Path of the health endpoint used as a connectivity probe
pub const HEALTH_PATH: &str = "/api/health";

// ============================================================================
// StudyApiClient
// ============================================================================

/// HTTP client for study server calls
///
/// Wraps `reqwest::Client` with an optional bearer token and base URL
/// construction. Every request is bounded by the timeout given at
/// construction; a timeout surfaces as [`ApiError::Timeout`].
#[derive(Clone)]
pub struct StudyApiClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// Optional bearer token
    auth_token: Option<String>,
}

impl StudyApiClient {
    /// Creates a client for `base_url` with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Creates a client from the `api` configuration section
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(match &config.auth_token {
            Some(token) => client.with_auth_token(token.clone()),
            None => client,
        })
    }

    /// Adds a bearer token to every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request builder for the given method and path
    ///
    /// Prepends the base URL and adds the Authorization header when a token
    /// is configured.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, &url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// POSTs a queued item's body to the endpoint for its kind
    ///
    /// Every HTTP response is returned as `Ok`, whatever its status.
    pub async fn submit(
        &self,
        kind: QueueItemKind,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, ApiError> {
        let endpoint = kind.endpoint();
        debug!(endpoint, kind = %kind, "Submitting queued item");

        let response = self
            .request(Method::POST, endpoint)
            .json(body)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(ApiError::from_transport)?;

        debug!(endpoint, status, "Submission answered");
        Ok(ApiResponse::new(status, parse_body(&text)))
    }

    /// Checks that the server answers at all
    ///
    /// Any HTTP response, including an error status, counts as reachable.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let response = self
            .request(Method::GET, HEALTH_PATH)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        debug!(status = response.status().as_u16(), "Health probe answered");
        Ok(())
    }
}

/// Parses a response body as JSON
///
/// An empty body becomes `Null`; a body that is not JSON is kept as a string.
pub(crate) fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
