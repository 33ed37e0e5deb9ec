//! Integration tests for offline submissions
//!
//! Verifies that StudyApiClient::submit posts to the endpoint for the item
//! kind and reports every HTTP status as a response.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use studysync_api::client::StudyApiClient;
use studysync_api::ApiError;
use studysync_core::domain::QueueItemKind;
use studysync_core::ports::IStudyApi;

use crate::common;

#[tokio::test]
async fn test_submit_posts_body_with_bearer_token() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/exams/offline-submit"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(body_partial_json(json!({
            "localExamId": "local-1",
            "syncQueueItemId": "item-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"examId": 77})))
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({"localExamId": "local-1", "syncQueueItemId": "item-1"});
    let response = client
        .submit(QueueItemKind::ExamSubmission, &body)
        .await
        .expect("submit failed");

    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert_eq!(response.body, json!({"examId": 77}));
}

#[tokio::test]
async fn test_each_kind_uses_its_endpoint() {
    let (server, client) = common::setup_api_mock().await;

    for kind in QueueItemKind::ALL {
        Mock::given(method("POST"))
            .and(path(kind.endpoint()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"kind": kind.as_str()})))
            .expect(1)
            .mount(&server)
            .await;
    }

    for kind in QueueItemKind::ALL {
        let response = client.submit_offline(kind, &json!({})).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body["kind"], kind.as_str());
    }
}

#[tokio::test]
async fn test_error_status_is_a_response_not_an_error() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_submit(
        &server,
        "/api/study/sessions/offline-submit",
        409,
        json!({"message": "duplicate"}),
    )
    .await;

    let response = client
        .submit(QueueItemKind::StudySession, &json!({}))
        .await
        .expect("409 is still a response");

    assert_eq!(response.status, 409);
    assert!(!response.is_success());
    assert_eq!(response.error_message(), "duplicate");
}

#[tokio::test]
async fn test_already_synced_body_is_forwarded() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_submit(
        &server,
        "/api/exams/offline-submit",
        200,
        json!({"alreadySynced": true, "examId": 12}),
    )
    .await;

    let response = client
        .submit(QueueItemKind::ExamSubmission, &json!({}))
        .await
        .unwrap();
    assert_eq!(response.body["alreadySynced"], true);
    assert_eq!(response.body["examId"], 12);
}

#[tokio::test]
async fn test_non_json_error_body_falls_back_to_status() {
    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/api/drills/offline-submit"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let response = client
        .submit(QueueItemKind::DrillResult, &json!({}))
        .await
        .unwrap();
    assert_eq!(response.status, 502);
    assert_eq!(response.body, json!("Bad Gateway"));
    assert_eq!(response.error_message(), "HTTP 502");
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let (server, _) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/api/study/flashcards/offline-rate"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = StudyApiClient::new(server.uri(), Duration::from_millis(100)).unwrap();
    let err = client
        .submit(QueueItemKind::FlashcardRating, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let client = StudyApiClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = client
        .submit(QueueItemKind::ExamSubmission, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::NetworkError(_) | ApiError::Timeout(_)
    ));
}
