//! Question cache scenarios

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use studysync_core::domain::CertificationId;
use studysync_sync::{CacheManager, CacheManagerError, CacheSettings, SyncEvent};

use crate::common::*;

fn cert(id: i64) -> CertificationId {
    CertificationId::new(id).unwrap()
}

fn manager(h: &Harness) -> CacheManager {
    CacheManager::new(
        Arc::clone(&h.store),
        Arc::clone(&h.api),
        Arc::clone(&h.events),
        CacheSettings::default(),
    )
}

#[tokio::test]
async fn test_cache_full_question_set() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/offline/questions/5"))
        .and(query_param("count", "200"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "questions": sample_questions(200) })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let log = EventLog::attach(&h.events);
    let cache = manager(&h);

    let status = cache
        .cache_questions_for_certification(cert(5), None)
        .await
        .unwrap();
    assert_eq!(status.certification_id, cert(5));
    assert_eq!(status.question_count, 200);
    assert!(!status.is_expired());
    let ttl = status.expires_at - status.cached_at;
    assert_eq!(ttl, chrono::Duration::days(7));

    let statuses = cache.get_all_cache_status().await.unwrap();
    assert_eq!(statuses, vec![status.clone()]);

    let cached = cache.get_cached_questions(cert(5)).await.unwrap().unwrap();
    assert_eq!(cached.questions.len(), 200);

    match log.events().as_slice() {
        [SyncEvent::CacheCompleted {
            certification_id,
            question_count,
            ..
        }] => {
            assert_eq!(*certification_id, cert(5));
            assert_eq!(*question_count, 200);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn test_explicit_count_is_sent() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/offline/questions/8"))
        .and(query_param("count", "25"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "questions": sample_questions(25) })),
        )
        .mount(&h.server)
        .await;

    let status = manager(&h)
        .cache_questions_for_certification(cert(8), Some(25))
        .await
        .unwrap();
    assert_eq!(status.question_count, 25);
}

#[tokio::test]
async fn test_fetch_failure_emits_cache_failed() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/offline/questions/5"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let log = EventLog::attach(&h.events);
    let cache = manager(&h);

    let err = cache
        .cache_questions_for_certification(cert(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheManagerError::Fetch(_)));
    assert!(cache.get_all_cache_status().await.unwrap().is_empty());
    assert_eq!(log.names(), vec!["cache:failed"]);
}

#[tokio::test]
async fn test_concurrent_refresh_is_rejected() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/offline/questions/5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "questions": sample_questions(3) }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&h.server)
        .await;

    let cache = Arc::new(manager(&h));
    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.cache_questions_for_certification(cert(5), None).await })
    };
    while h.server.received_requests().await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = cache.cache_questions_for_certification(cert(5), None).await;
    assert!(matches!(
        second,
        Err(CacheManagerError::RefreshInProgress(id)) if id == cert(5)
    ));

    let status = first.await.unwrap().unwrap();
    assert_eq!(status.question_count, 3);
    assert_eq!(h.server.received_requests().await.unwrap().len(), 1);

    // Released once the first refresh finished
    cache
        .cache_questions_for_certification(cert(5), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_clear_cache_removes_entry() {
    let h = setup().await;
    mount_questions(&h.server, 5, 10).await;

    let log = EventLog::attach(&h.events);
    let cache = manager(&h);
    cache
        .cache_questions_for_certification(cert(5), None)
        .await
        .unwrap();

    assert!(cache.clear_cache(cert(5)).await.unwrap());
    assert!(cache.get_cached_questions(cert(5)).await.unwrap().is_none());
    assert!(!cache.clear_cache(cert(5)).await.unwrap());
    assert_eq!(
        log.names(),
        vec!["cache:completed", "cache:cleared", "cache:cleared"]
    );
}

#[tokio::test]
async fn test_refresh_all_continues_past_failures() {
    let h = setup().await;
    mount_questions(&h.server, 5, 4).await;
    Mock::given(method("GET"))
        .and(path("/api/offline/questions/7"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;
    mount_questions(&h.server, 9, 2).await;

    let cache = manager(&h);
    let first = cache
        .cache_questions_for_certification(cert(5), None)
        .await
        .unwrap();

    let summary = cache.refresh_all(&[cert(7), cert(9)]).await.unwrap();
    assert_eq!(summary.refreshed, vec![cert(5), cert(9)]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, cert(7));
    assert!(summary.skipped.is_empty());

    let statuses = cache.get_all_cache_status().await.unwrap();
    assert_eq!(statuses.len(), 2);
    let refreshed = statuses
        .iter()
        .find(|status| status.certification_id == cert(5))
        .unwrap();
    assert!(refreshed.cached_at >= first.cached_at);
    assert!(refreshed.expires_at > Utc::now());
}
