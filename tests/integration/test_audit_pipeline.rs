// End-to-end tests for audit ingestion, detection and alerting

use crate::common::*;
use sentinel_trust::audit::{AuditPipeline, PipelineStats};
use sentinel_trust::core::models::{AlertFilter, AlertSeverity, SecurityRule};
use sentinel_trust::engine::rule_engine::RuleEngine;
use sentinel_trust::engine::threat_detector::ThreatDetector;
use sentinel_trust::state::memory_store::MemoryAuditStore;
use sentinel_trust::state::{AlertSink, AuditStore};
use static_assertions::assert_impl_all;
use std::sync::atomic::Ordering;
use std::sync::Arc;

assert_impl_all!(AuditPipeline: Send, Sync);
assert_impl_all!(ThreatDetector: Send, Sync);
assert_impl_all!(RuleEngine: Send, Sync);
assert_impl_all!(MemoryAuditStore: Send, Sync);

fn login_rule() -> SecurityRule {
    threshold_rule("failed_logins", "AUTHENTICATION", "FAILURE", 5, 900)
}

#[tokio::test]
async fn test_fifth_failure_raises_one_rule_alert() {
    let store = Arc::new(MemoryAuditStore::new());
    let harness = pipeline_harness(store.clone(), vec![login_rule()], 64);

    for _ in 0..4 {
        harness.pipeline.submit(auth_failure("alice", "203.0.113.10"));
    }
    wait_for_processed(&harness.pipeline, 4).await;

    let rule_alerts = harness
        .sink
        .get_alerts(&AlertFilter::for_rule("failed_logins"))
        .await
        .unwrap();
    assert!(rule_alerts.is_empty());

    harness.pipeline.submit(auth_failure("alice", "203.0.113.10"));
    wait_for_processed(&harness.pipeline, 5).await;

    let rule_alerts = harness
        .sink
        .get_alerts(&AlertFilter::for_rule("failed_logins"))
        .await
        .unwrap();
    assert_eq!(rule_alerts.len(), 1);
    assert_eq!(rule_alerts[0].severity, AlertSeverity::High);
    assert!(rule_alerts[0].events.len() <= 10);
    assert_eq!(rule_alerts[0].events.len(), 5);

    // The brute force pattern fires on the same event
    let threat_alerts = harness
        .sink
        .get_alerts(&AlertFilter::for_rule("threat:brute_force"))
        .await
        .unwrap();
    assert_eq!(threat_alerts.len(), 1);
    assert!(harness.tracker.ip_risk("203.0.113.10").unwrap() > 0);

    assert_eq!(store.len().await, 5);
    let stats = harness.pipeline.stats();
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.alerts_raised, 2);

    harness.pipeline.stop().await;
}

#[tokio::test]
async fn test_events_processed_in_submission_order() {
    let store = Arc::new(MemoryAuditStore::new());
    let harness = pipeline_harness(store.clone(), Vec::new(), 64);

    for seq in 0..20 {
        harness
            .pipeline
            .submit(data_access("bob", "10.0.0.2").detail("seq", seq));
    }
    wait_for_processed(&harness.pipeline, 20).await;

    let newest_first = store.events_by_user("bob", 100).await.unwrap();
    let seqs: Vec<i64> = newest_first
        .iter()
        .rev()
        .map(|e| e.details["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (0..20).collect::<Vec<i64>>());

    harness.pipeline.stop().await;
}

#[tokio::test]
async fn test_bounded_store_keeps_newest_events() {
    let store = Arc::new(MemoryAuditStore::with_max_events(10));
    let harness = pipeline_harness(store.clone(), Vec::new(), 64);

    for seq in 0..25 {
        harness
            .pipeline
            .submit(data_access("frank", "10.0.0.6").detail("seq", seq));
    }
    wait_for_processed(&harness.pipeline, 25).await;

    assert_eq!(store.len().await, 10);
    let newest_first = store.events_by_user("frank", 100).await.unwrap();
    let seqs: Vec<i64> = newest_first
        .iter()
        .rev()
        .map(|e| e.details["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (15..25).collect::<Vec<i64>>());

    harness.pipeline.stop().await;
}

#[tokio::test]
async fn test_full_queue_drops_without_blocking() {
    let store = Arc::new(GatedStore::new());
    let capacity = 4;
    let harness = pipeline_harness(store.clone(), Vec::new(), capacity);

    // The consumer cannot run before the first await on this runtime
    for _ in 0..10 {
        harness.pipeline.submit(data_access("carol", "10.0.0.3"));
    }

    let stats = harness.pipeline.stats();
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.dropped, 6);

    store.open();
    wait_for_processed(&harness.pipeline, 4).await;

    assert_eq!(store.inner.len().await, 4);
    assert_eq!(harness.pipeline.stats().processed, 4);

    harness.pipeline.stop().await;
}

#[tokio::test]
async fn test_storage_failure_does_not_stop_detection() {
    let store = Arc::new(FailingStore::default());
    let harness = pipeline_harness(store.clone(), vec![login_rule()], 64);

    for i in 0..5 {
        harness
            .pipeline
            .submit(security_violation(&format!("192.0.2.{}", i)));
    }
    wait_for_processed(&harness.pipeline, 5).await;

    let stats = harness.pipeline.stats();
    assert_eq!(stats.storage_failures, 5);
    assert_eq!(stats.processed, 5);
    // Breaker opened after three consecutive failures
    assert_eq!(store.store_calls.load(Ordering::SeqCst), 3);

    let violations = harness
        .sink
        .get_alerts(&AlertFilter::for_rule("threat:security_violation"))
        .await
        .unwrap();
    assert_eq!(violations.len(), 5);
    assert_eq!(harness.tracker.ip_risk("192.0.2.4").unwrap(), 50);

    harness.pipeline.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_rejects_new_events() {
    let store = Arc::new(MemoryAuditStore::new());
    let harness = pipeline_harness(store.clone(), Vec::new(), 16);

    harness.pipeline.submit(data_access("dave", "10.0.0.4"));
    wait_for_processed(&harness.pipeline, 1).await;

    harness.pipeline.stop().await;
    harness.pipeline.stop().await;

    harness.pipeline.submit(data_access("dave", "10.0.0.4"));
    assert_eq!(
        harness.pipeline.stats(),
        PipelineStats {
            submitted: 1,
            dropped: 1,
            processed: 1,
            storage_failures: 0,
            alerts_raised: 0,
        }
    );
    assert_eq!(store.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let store = Arc::new(MemoryAuditStore::new());
    let harness = Arc::new(pipeline_harness(store.clone(), Vec::new(), 1024));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                harness
                    .pipeline
                    .submit(data_access(&format!("user-{}", worker), "10.0.0.5"));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = harness.pipeline.stats();
    assert_eq!(stats.submitted + stats.dropped, 400);
    wait_for_processed(&harness.pipeline, stats.submitted).await;
    assert_eq!(store.len().await as u64, stats.submitted);

    harness.pipeline.stop().await;
}
