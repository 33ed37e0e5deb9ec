//! Coordinator scenarios: connectivity, startup, host callbacks

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use studysync_core::config::ConfigBuilder;
use studysync_core::domain::{CertificationId, QueueItemKind, QueueItemStatus};
use studysync_core::ports::IHostScheduler;
use studysync_sync::{SyncContext, SyncCoordinator, SyncEvent};

use crate::common::*;

fn coordinator(h: &Harness, host: Arc<dyn IHostScheduler>, online: bool) -> SyncCoordinator {
    let context = SyncContext {
        store: Arc::clone(&h.store),
        api: Arc::clone(&h.api),
        host,
        events: Arc::clone(&h.events),
        metrics: None,
    };
    SyncCoordinator::new(context, &h.config(), online)
}

#[tokio::test]
async fn test_reconnect_triggers_pass() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    let host = Arc::new(RecordingHost::default());
    let coordinator = coordinator(&h, host, false);
    let log = EventLog::attach(&h.events);

    coordinator
        .enqueue(QueueItemKind::ExamSubmission, json!({"localExamId": "e1"}), None)
        .await
        .unwrap();

    assert!(coordinator.set_online(false).is_none());
    assert!(log.names().is_empty());

    let handle = coordinator.set_online(true).expect("pass spawned");
    let result = handle.await.unwrap().unwrap().unwrap();
    assert_eq!(result.successful, 1);
    assert!(coordinator.is_online());

    let names = log.names();
    assert_eq!(names[0], "online-status-changed");
    assert!(names.contains(&"sync:completed"));

    assert!(coordinator.set_online(false).is_none());
    assert!(matches!(
        log.events().last(),
        Some(SyncEvent::OnlineStatusChanged { is_online: false })
    ));
}

#[tokio::test]
async fn test_offline_enqueue_requests_background_sync() {
    let h = setup().await;
    let host = Arc::new(RecordingHost::default());
    let coordinator = coordinator(&h, host.clone(), false);

    coordinator
        .enqueue(QueueItemKind::DrillResult, json!({"score": 3}), None)
        .await
        .unwrap();
    assert_eq!(host.calls(), vec!["background:offline-sync"]);

    mount_submit(&h.server, DRILL_ENDPOINT, 200, json!({})).await;
    let pass = coordinator.set_online(true).expect("pass spawned");
    pass.await.unwrap().unwrap();

    coordinator
        .enqueue(QueueItemKind::DrillResult, json!({"score": 4}), None)
        .await
        .unwrap();
    assert_eq!(host.calls().len(), 1);
}

#[tokio::test]
async fn test_background_request_failure_keeps_item_queued() {
    let h = setup().await;
    let host = Arc::new(RecordingHost::failing_background());
    let coordinator = coordinator(&h, host, false);

    let id = coordinator
        .enqueue(QueueItemKind::FlashcardRating, json!({"cardId": 4, "rating": 3}), None)
        .await
        .unwrap();
    assert!(h.store.get_item(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_start_recovers_interrupted_items_and_drains() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;

    let id = h
        .store
        .enqueue(QueueItemKind::ExamSubmission, json!({"localExamId": "e1"}), None)
        .await
        .unwrap();
    let mut item = h.store.get_item(&id).await.unwrap().unwrap();
    item.mark_in_progress(chrono::Utc::now()).unwrap();
    h.store.update(&item).await.unwrap();

    let coordinator = coordinator(&h, Arc::new(RecordingHost::default()), true);
    let result = coordinator.start().await.unwrap().expect("pass ran");
    assert_eq!(result.successful, 1);
    assert_eq!(h.store.get_pending_count().await.unwrap(), 0);

    // Second start is a no-op
    assert!(coordinator.start().await.unwrap().is_none());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_start_offline_only_recovers() {
    let h = setup().await;
    let id = h
        .store
        .enqueue(QueueItemKind::ExamSubmission, json!({"localExamId": "e1"}), None)
        .await
        .unwrap();
    let mut item = h.store.get_item(&id).await.unwrap().unwrap();
    item.mark_in_progress(chrono::Utc::now()).unwrap();
    h.store.update(&item).await.unwrap();

    let coordinator = coordinator(&h, Arc::new(RecordingHost::default()), false);
    assert!(coordinator.start().await.unwrap().is_none());

    let item = h.store.get_item(&id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);
    assert!(h.server.received_requests().await.unwrap().is_empty());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_host_periodic_refresh() {
    let h = setup().await;
    mount_questions(&h.server, 5, 3).await;
    let host = Arc::new(RecordingHost::granting());

    let config = ConfigBuilder::new()
        .api_base_url(h.server.uri())
        .cache_certifications(vec![5])
        .cache_startup_refresh_delay_secs(0)
        .build();
    let coordinator = SyncCoordinator::new(
        SyncContext {
            store: Arc::clone(&h.store),
            api: Arc::clone(&h.api),
            host: host.clone(),
            events: Arc::clone(&h.events),
            metrics: None,
        },
        &config,
        true,
    );

    coordinator.start().await.unwrap();
    assert!(coordinator.uses_host_periodic_refresh());

    // No local timer: nothing is fetched until the host calls back
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.server.received_requests().await.unwrap().is_empty());

    let summary = coordinator.on_periodic_sync().await.unwrap();
    assert_eq!(summary.refreshed, vec![CertificationId::new(5).unwrap()]);

    coordinator.shutdown().await;
    assert_eq!(
        host.calls(),
        vec!["register:question-cache-refresh", "unregister:question-cache-refresh"]
    );
}

#[tokio::test]
async fn test_fallback_refresh_runs_after_startup_delay() {
    let h = setup().await;
    mount_questions(&h.server, 5, 3).await;

    let config = ConfigBuilder::new()
        .api_base_url(h.server.uri())
        .cache_certifications(vec![5])
        .cache_startup_refresh_delay_secs(0)
        .build();
    let coordinator = SyncCoordinator::new(
        SyncContext {
            store: Arc::clone(&h.store),
            api: Arc::clone(&h.api),
            host: Arc::new(RecordingHost::default()),
            events: Arc::clone(&h.events),
            metrics: None,
        },
        &config,
        true,
    );

    coordinator.start().await.unwrap();
    assert!(!coordinator.uses_host_periodic_refresh());

    let cert = CertificationId::new(5).unwrap();
    let mut cached = None;
    for _ in 0..200 {
        cached = coordinator
            .cache_manager()
            .get_cached_questions(cert)
            .await
            .unwrap();
        if cached.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(cached.expect("fallback refresh ran").questions.len(), 3);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_sync_now_is_noop_while_offline() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    let coordinator = coordinator(&h, Arc::new(RecordingHost::default()), false);
    coordinator
        .enqueue(QueueItemKind::ExamSubmission, json!({"localExamId": "e1"}), None)
        .await
        .unwrap();

    assert!(coordinator.sync_now().await.unwrap().is_none());
    assert_eq!(h.store.get_pending_count().await.unwrap(), 1);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_now_and_background_wake_drain_queue() {
    let h = setup().await;
    mount_submit(&h.server, EXAM_ENDPOINT, 200, json!({})).await;
    let coordinator = coordinator(&h, Arc::new(RecordingHost::default()), true);

    coordinator
        .enqueue(QueueItemKind::ExamSubmission, json!({"localExamId": "e1"}), None)
        .await
        .unwrap();
    let result = coordinator.sync_now().await.unwrap().expect("pass ran");
    assert_eq!(result.successful, 1);

    coordinator
        .enqueue(QueueItemKind::ExamSubmission, json!({"localExamId": "e2"}), None)
        .await
        .unwrap();
    let result = coordinator.on_background_sync().await.unwrap().expect("pass ran");
    assert_eq!(result.successful, 1);
    assert_eq!(h.store.get_pending_count().await.unwrap(), 0);
}
