//! Integration tests for the connectivity probe

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use studysync_api::client::StudyApiClient;
use studysync_core::ports::IStudyApi;

use crate::common;

#[tokio::test]
async fn test_ping_ok() {
    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    IStudyApi::ping(&client).await.expect("server reachable");
}

#[tokio::test]
async fn test_ping_counts_error_status_as_reachable() {
    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(client.ping().await.is_ok());
}

#[tokio::test]
async fn test_ping_unreachable() {
    let client = StudyApiClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    assert!(client.ping().await.is_err());
}
