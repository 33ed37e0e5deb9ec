//! Shared test helpers for study server integration tests
//!
//! Provides wiremock-based mock server setup. Each helper mounts the
//! necessary mock endpoints; `setup_api_mock` returns a configured
//! StudyApiClient pointing at the mock server.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use studysync_api::client::StudyApiClient;

/// Starts a mock server and returns a (MockServer, StudyApiClient) tuple.
///
/// The client carries the bearer token `test-access-token` and a short
/// request timeout.
pub async fn setup_api_mock() -> (MockServer, StudyApiClient) {
    let server = MockServer::start().await;
    let client = StudyApiClient::new(server.uri(), Duration::from_secs(2))
        .expect("build client")
        .with_auth_token("test-access-token");
    (server, client)
}

/// Mounts a POST endpoint answering with `status` and a JSON body.
pub async fn mount_submit(
    server: &MockServer,
    endpoint: &str,
    status: u16,
    body: serde_json::Value,
) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the question endpoint for one certification.
pub async fn mount_questions(server: &MockServer, certification_id: i64, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/offline/questions/{}", certification_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Builds `n` question documents with ids 1..=n.
pub fn sample_questions(n: usize) -> Vec<serde_json::Value> {
    (1..=n)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "text": format!("Question {}", i),
                "choices": ["A", "B", "C", "D"],
            })
        })
        .collect()
}
