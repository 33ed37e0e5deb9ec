//! Queue processor scenarios

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use studysync_api::client::StudyApiClient;
use studysync_core::domain::{QueueItemId, QueueItemKind, QueueItemStatus};
use studysync_core::ports::IOfflineStore;
use studysync_sync::backoff::BackoffPolicy;
use studysync_sync::metrics::SyncMetrics;
use studysync_sync::{ProcessorConfig, SyncEvent, SyncQueueProcessor};

use crate::common::*;

async fn enqueue_exam(store: &Arc<dyn IOfflineStore>, local_id: &str) -> QueueItemId {
    store
        .enqueue(
            QueueItemKind::ExamSubmission,
            json!({"localExamId": local_id, "certificationId": 5, "responses": []}),
            Some(local_id.to_string()),
        )
        .await
        .expect("enqueue")
}

#[tokio::test]
async fn test_three_items_all_succeed() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({"examId": 1})).await;
    mount_submit(&h.server, SESSION_ENDPOINT, 201, json!({"sessionId": 2})).await;
    mount_submit(&h.server, DRILL_ENDPOINT, 200, json!({})).await;

    enqueue_exam(&h.store, "exam-1").await;
    h.store
        .enqueue(QueueItemKind::StudySession, json!({"minutes": 30}), None)
        .await
        .unwrap();
    h.store
        .enqueue(QueueItemKind::DrillResult, json!({"score": 8}), None)
        .await
        .unwrap();

    let log = EventLog::attach(&h.events);
    let (_online, processor) = h.online_processor();

    let result = processor.process_queue().await.unwrap().expect("pass ran");
    assert_eq!(result.total_processed, 3);
    assert_eq!(result.successful, 3);
    assert_eq!(result.failed, 0);
    assert!(!result.stopped_early);

    assert_eq!(
        log.names(),
        vec![
            "sync:started",
            "sync:item:success",
            "sync:item:success",
            "sync:item:success",
            "sync:completed"
        ]
    );
    assert!(matches!(
        log.events().last(),
        Some(SyncEvent::SyncCompleted { total_processed: 3, .. })
    ));
    assert_eq!(h.store.get_pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_conflict_is_dead_lettered_without_retry() {
    let h = setup().await;
    mount_submit(
        &h.server,
        EXAM_ENDPOINT,
        409,
        json!({"message": "Exam already submitted"}),
    )
    .await;
    let id = enqueue_exam(&h.store, "exam-1").await;

    let log = EventLog::attach(&h.events);
    let (_online, processor) = h.online_processor();
    let result = processor.process_queue().await.unwrap().unwrap();

    assert_eq!(result.dead_lettered, 1);
    assert_eq!(h.store.get_pending_count().await.unwrap(), 0);

    let dead = h.store.list_dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].item.id, id);
    assert_eq!(dead[0].item.retry_count, 0);
    assert_eq!(dead[0].error, "Permanent failure: Exam already submitted");
    assert!(log.names().contains(&"sync:item:dead-letter"));
}

#[tokio::test]
async fn test_not_found_and_bad_request_are_permanent() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 400, json!({"error": "Invalid payload"})).await;
    mount_submit(&h.server, DRILL_ENDPOINT, 404, json!({})).await;
    enqueue_exam(&h.store, "exam-1").await;
    h.store
        .enqueue(QueueItemKind::DrillResult, json!({"score": 1}), None)
        .await
        .unwrap();

    let (_online, processor) = h.online_processor();
    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.dead_lettered, 2);

    let errors: Vec<String> = h
        .store
        .list_dead_letters()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.error)
        .collect();
    assert!(errors.contains(&"Permanent failure: Invalid payload".to_string()));
    assert!(errors.contains(&"Permanent failure: HTTP 404".to_string()));
}

#[tokio::test]
async fn test_server_error_is_retried_later() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;
    let id = enqueue_exam(&h.store, "exam-1").await;

    let log = EventLog::attach(&h.events);
    let (_online, processor) = h.online_processor();
    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.failed, 1);

    let item = h.store.get_item(&id).await.unwrap().expect("still queued");
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.status, QueueItemStatus::Pending);
    assert_eq!(item.last_error.as_deref(), Some("HTTP 503"));
    assert!(item.last_attempt_at.is_some());

    let failed = log
        .events()
        .into_iter()
        .find_map(|event| match event {
            SyncEvent::ItemFailed { next_retry_ms, .. } => Some(next_retry_ms),
            _ => None,
        })
        .expect("failure event");
    assert!((2_000..=2_500).contains(&failed));
}

#[tokio::test]
async fn test_network_error_is_transient() {
    let h = setup().await;
    let unreachable = StudyApiClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
    let id = enqueue_exam(&h.store, "exam-1").await;

    let (_tx, rx) = watch::channel(true);
    let processor = SyncQueueProcessor::new(
        Arc::clone(&h.store),
        Arc::new(unreachable),
        Arc::clone(&h.events),
        rx,
        fast_processor_config(),
    );
    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.failed, 1);

    let item = h.store.get_item(&id).await.unwrap().unwrap();
    assert_eq!(item.retry_count, 1);
    assert!(item.last_error.is_some());
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;
    let slow = StudyApiClient::new(h.server.uri(), Duration::from_millis(200)).unwrap();
    let id = enqueue_exam(&h.store, "exam-1").await;

    let (_tx, rx) = watch::channel(true);
    let processor = SyncQueueProcessor::new(
        Arc::clone(&h.store),
        Arc::new(slow),
        Arc::clone(&h.events),
        rx,
        fast_processor_config(),
    );
    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(h.store.get_item(&id).await.unwrap().unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_exhausted_item_is_dead_lettered_without_request() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let id = enqueue_exam(&h.store, "exam-1").await;
    let mut item = h.store.get_item(&id).await.unwrap().unwrap();
    item.retry_count = 5;
    item.last_error = Some("HTTP 500".to_string());
    h.store.update(&item).await.unwrap();

    let (_online, processor) = h.online_processor();
    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.dead_lettered, 1);

    let dead = h.store.list_dead_letters().await.unwrap();
    assert_eq!(dead[0].error, "HTTP 500");
    assert_eq!(dead[0].item.retry_count, 5);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_items_are_sent_oldest_first() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;

    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(enqueue_exam(&h.store, &format!("exam-{n}")).await);
    }

    let (_online, processor) = h.online_processor();
    processor.process_queue().await.unwrap().unwrap();

    let sent: Vec<String> = h
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            body["syncQueueItemId"].as_str().unwrap().to_string()
        })
        .collect();
    let expected: Vec<String> = ids.iter().map(ToString::to_string).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn test_request_body_carries_sync_metadata() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    let id = enqueue_exam(&h.store, "exam-1").await;
    let created_at = h.store.get_item(&id).await.unwrap().unwrap().created_at;

    let (_online, processor) = h.online_processor();
    processor.process_queue().await.unwrap().unwrap();

    let requests = h.server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["localExamId"], "exam-1");
    assert_eq!(body["syncQueueItemId"], id.to_string());
    let client_timestamp = chrono::DateTime::parse_from_rfc3339(body["clientTimestamp"].as_str().unwrap())
        .unwrap()
        .with_timezone(&chrono::Utc);
    assert_eq!(client_timestamp, created_at);
}

#[tokio::test]
async fn test_duplicate_submission_reports_already_synced() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"examId": 9})))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({"alreadySynced": true, "examId": 9})).await;
    enqueue_exam(&h.store, "exam-1").await;
    enqueue_exam(&h.store, "exam-1").await;

    let log = EventLog::attach(&h.events);
    let (_online, processor) = h.online_processor();
    let result = processor.process_queue().await.unwrap().unwrap();

    assert_eq!(result.successful, 2);
    assert_eq!(result.already_synced, 1);
    let outcomes: Vec<(bool, serde_json::Value)> = log
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::ItemSuccess {
                already_synced,
                server_response,
                ..
            } => Some((already_synced, server_response)),
            _ => None,
        })
        .collect();
    let flags: Vec<bool> = outcomes.iter().map(|(flag, _)| *flag).collect();
    assert_eq!(flags, vec![false, true]);
    for (_, response) in &outcomes {
        assert_eq!(response["examId"], 9);
    }
    assert_eq!(h.store.get_pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_back_to_back_passes_respect_backoff() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;
    let id = enqueue_exam(&h.store, "exam-1").await;

    let log = EventLog::attach(&h.events);
    let (_online, processor) = h.online_processor();
    let first = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(first.failed, 1);

    for _ in 0..5 {
        let result = processor.process_queue().await.unwrap().unwrap();
        assert_eq!(result.total_processed, 0);
        assert_eq!(result.deferred, 1);
    }

    let item = h.store.get_item(&id).await.unwrap().expect("still queued");
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.status, QueueItemStatus::Pending);
    assert!(h.store.list_dead_letters().await.unwrap().is_empty());
    assert_eq!(h.server.received_requests().await.unwrap().len(), 1);
    assert_eq!(
        log.names(),
        vec!["sync:started", "sync:item:failed", "sync:completed"]
    );
}

#[tokio::test]
async fn test_failed_item_is_retried_once_backoff_elapses() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;
    let id = enqueue_exam(&h.store, "exam-1").await;

    let (_tx, rx) = watch::channel(true);
    let processor = SyncQueueProcessor::new(
        Arc::clone(&h.store),
        Arc::clone(&h.api),
        Arc::clone(&h.events),
        rx,
        ProcessorConfig {
            backoff: BackoffPolicy::new(20, 50),
            ..fast_processor_config()
        },
    );

    assert_eq!(processor.process_queue().await.unwrap().unwrap().failed, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(second.failed, 1);
    assert_eq!(second.deferred, 0);
    assert_eq!(h.store.get_item(&id).await.unwrap().unwrap().retry_count, 2);
    assert_eq!(h.server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_trigger_returns_none() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path(EXAM_ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&h.server)
        .await;
    enqueue_exam(&h.store, "exam-1").await;

    let (_online, processor) = h.online_processor();
    let processor = Arc::new(processor);

    let first = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.process_queue().await })
    };
    while !processor.is_syncing() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(processor.process_queue().await.unwrap().is_none());

    let result = first.await.unwrap().unwrap().unwrap();
    assert_eq!(result.total_processed, 1);
    assert!(!processor.is_syncing());
    assert_eq!(h.server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_offline_pass_is_skipped() {
    let h = setup().await;
    enqueue_exam(&h.store, "exam-1").await;

    let log = EventLog::attach(&h.events);
    let (_tx, rx) = watch::channel(false);
    let processor = h.processor(rx);

    assert!(processor.process_queue().await.unwrap().is_none());
    assert!(log.names().is_empty());
    assert_eq!(h.store.get_pending_count().await.unwrap(), 1);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_queue_emits_nothing() {
    let h = setup().await;
    let log = EventLog::attach(&h.events);
    let (_online, processor) = h.online_processor();

    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.total_processed, 0);
    assert!(log.names().is_empty());
}

#[tokio::test]
async fn test_going_offline_stops_pass_between_items() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    for n in 0..3 {
        enqueue_exam(&h.store, &format!("exam-{n}")).await;
    }

    let log = EventLog::attach(&h.events);
    let (online, processor) = h.online_processor();
    let _go_offline = h.events.subscribe(move |event| {
        if let SyncEvent::ItemSuccess { .. } = event {
            online.send_replace(false);
        }
    });

    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.total_processed, 1);
    assert!(result.stopped_early);
    assert_eq!(h.store.get_pending_count().await.unwrap(), 2);
    assert_eq!(
        log.names(),
        vec!["sync:started", "sync:item:success", "sync:completed"]
    );
}

#[tokio::test]
async fn test_shutdown_stops_pass_between_items() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    for n in 0..3 {
        enqueue_exam(&h.store, &format!("exam-{n}")).await;
    }

    let token = CancellationToken::new();
    let (_online, processor) = h.online_processor();
    let processor = processor.with_shutdown(token.clone());
    let _cancel = h.events.subscribe(move |event| {
        if let SyncEvent::ItemSuccess { .. } = event {
            token.cancel();
        }
    });

    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.total_processed, 1);
    assert!(result.stopped_early);
    assert_eq!(h.store.get_pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_per_item_failures_do_not_abort_pass() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 500, json!({"message": "boom"})).await;
    mount_submit(&h.server, DRILL_ENDPOINT, 409, json!({})).await;
    mount_submit(&h.server, SESSION_ENDPOINT, 200, json!({})).await;

    enqueue_exam(&h.store, "exam-1").await;
    h.store
        .enqueue(QueueItemKind::DrillResult, json!({"score": 2}), None)
        .await
        .unwrap();
    h.store
        .enqueue(QueueItemKind::StudySession, json!({"minutes": 5}), None)
        .await
        .unwrap();

    let (_online, processor) = h.online_processor();
    let result = processor.process_queue().await.unwrap().unwrap();
    assert_eq!(result.total_processed, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.dead_lettered, 1);
    assert_eq!(result.successful, 1);
    assert_eq!(h.store.get_pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_metrics_are_recorded() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    enqueue_exam(&h.store, "exam-1").await;

    let metrics = Arc::new(SyncMetrics::new().unwrap());
    let (_online, processor) = h.online_processor();
    let processor = processor.with_metrics(Arc::clone(&metrics));
    processor.process_queue().await.unwrap().unwrap();

    assert_eq!(
        metrics
            .items_total
            .with_label_values(&["exam_submission", "success"])
            .get(),
        1
    );
    assert_eq!(
        metrics.passes_total.with_label_values(&["completed"]).get(),
        1
    );
    assert_eq!(metrics.pending_items.get(), 0);
}
