// In-memory audit store and alert sink

use crate::core::errors::TrustError;
use crate::core::models::{AlertFilter, AuditEvent, EventFilter, SecurityAlert};
use crate::state::{AlertSink, AuditStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::warn;

/// Audit store backed by a bounded in-memory ring
///
/// Once `max_events` is reached the oldest event is evicted.
pub struct MemoryAuditStore {
    events: RwLock<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::with_max_events(usize::MAX)
    }

    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max_events.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    async fn newest_matching<F>(&self, limit: usize, predicate: F) -> Vec<AuditEvent>
    where
        F: Fn(&AuditEvent) -> bool,
    {
        self.events
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| predicate(e))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn store(&self, event: &AuditEvent) -> Result<(), TrustError> {
        let mut events = self.events.write().await;
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }

    async fn query(&self, filter: &EventFilter, limit: usize) -> Result<Vec<AuditEvent>, TrustError> {
        Ok(self.newest_matching(limit, |e| filter.matches(e)).await)
    }

    async fn events_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, TrustError> {
        let mut matched: Vec<AuditEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }

    async fn events_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEvent>, TrustError> {
        Ok(self
            .newest_matching(limit, |e| e.user_id.as_deref() == Some(user_id))
            .await)
    }

    async fn events_by_ip(&self, ip_address: &str, limit: usize) -> Result<Vec<AuditEvent>, TrustError> {
        Ok(self.newest_matching(limit, |e| e.ip_address == ip_address).await)
    }
}

/// Alert sink that keeps delivered alerts in memory and logs them
pub struct MemoryAlertSink {
    alerts: RwLock<Vec<SecurityAlert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }
}

impl Default for MemoryAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn send_alert(&self, alert: &SecurityAlert) -> Result<(), TrustError> {
        warn!(
            target: "audit",
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            severity = ?alert.severity,
            sample_events = alert.events.len(),
            "{}",
            alert.message
        );
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn get_alerts(&self, filter: &AlertFilter) -> Result<Vec<SecurityAlert>, TrustError> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }
}
