// Unit tests for the in-memory audit store and alert sink

use crate::common::*;
use chrono::{Duration, Utc};
use sentinel_trust::core::models::*;
use sentinel_trust::state::memory_store::{MemoryAlertSink, MemoryAuditStore};
use sentinel_trust::state::{AlertSink, AuditStore};
use std::sync::Arc;

#[tokio::test]
async fn test_query_filters_newest_first() {
    let store = MemoryAuditStore::new();
    let now = Utc::now();
    for i in 0..4 {
        store
            .store(&event_at(auth_failure("alice", "203.0.113.1"), now + Duration::seconds(i)))
            .await
            .unwrap();
    }
    store.store(&event_at(data_access("alice", "203.0.113.1"), now)).await.unwrap();
    store.store(&event_at(auth_failure("bob", "203.0.113.2"), now)).await.unwrap();

    let filter = EventFilter {
        event_type: Some("AUTHENTICATION".to_string()),
        user_id: Some("alice".to_string()),
        ..Default::default()
    };
    let events = store.query(&filter, 3).await.unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].timestamp, now + Duration::seconds(3));
    assert!(events.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert!(store.query(&filter, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_time_bounds() {
    let store = MemoryAuditStore::new();
    let now = Utc::now();
    store
        .store(&event_at(data_access("carol", "10.0.0.3"), now - Duration::hours(2)))
        .await
        .unwrap();
    store.store(&event_at(data_access("carol", "10.0.0.3"), now)).await.unwrap();

    let recent = EventFilter {
        since: Some(now - Duration::hours(1)),
        until: Some(now),
        ..Default::default()
    };
    assert_eq!(store.query(&recent, 100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_time_range_excludes_outside_events() {
    let store = MemoryAuditStore::new();
    let now = Utc::now();
    for offset in [-120, -60, 0, 60] {
        store
            .store(&event_at(security_violation("10.0.0.4"), now + Duration::seconds(offset)))
            .await
            .unwrap();
    }

    let events = store
        .events_by_time_range(now - Duration::seconds(60), now)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].timestamp, now - Duration::seconds(60));
    assert_eq!(events[1].timestamp, now);
}

#[tokio::test]
async fn test_concurrent_writers() {
    let store = Arc::new(MemoryAuditStore::new());

    let mut handles = Vec::new();
    for worker in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                let user = format!("user-{}", worker);
                store.store(&event(data_access(&user, "10.0.0.5"))).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.len().await, 200);
    assert_eq!(store.events_by_user("user-3", 100).await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_alert_sink_filters() {
    let sink = MemoryAlertSink::new();
    assert!(sink.is_empty().await);

    sink.send_alert(&SecurityAlert::new("brute_force_login", AlertSeverity::High, "a", vec![]))
        .await
        .unwrap();
    sink.send_alert(&SecurityAlert::new("threat:security_violation", AlertSeverity::Critical, "b", vec![]))
        .await
        .unwrap();

    let critical = AlertFilter {
        severity: Some(AlertSeverity::Critical),
        ..Default::default()
    };
    let alerts = sink.get_alerts(&critical).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, "threat:security_violation");

    let open = AlertFilter {
        status: Some(AlertStatus::Open),
        ..Default::default()
    };
    assert_eq!(sink.get_alerts(&open).await.unwrap().len(), 2);

    let closed = AlertFilter {
        status: Some(AlertStatus::Closed),
        ..Default::default()
    };
    assert!(sink.get_alerts(&closed).await.unwrap().is_empty());
}
