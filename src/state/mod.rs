// Storage and alert delivery collaborators

use crate::core::errors::TrustError;
use crate::core::models::{AlertFilter, AuditEvent, EventFilter, SecurityAlert};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory_store;

/// Persistent audit event storage
///
/// Implementations own their concurrency. Failures are reported as
/// `TrustError::StorageError` and never stop the audit pipeline.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn store(&self, event: &AuditEvent) -> Result<(), TrustError>;

    /// Events matching `filter`, newest first, at most `limit`
    async fn query(&self, filter: &EventFilter, limit: usize) -> Result<Vec<AuditEvent>, TrustError>;

    /// Events with `start <= timestamp <= end`, oldest first
    async fn events_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, TrustError>;

    /// Newest first
    async fn events_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEvent>, TrustError>;

    /// Newest first
    async fn events_by_ip(&self, ip_address: &str, limit: usize) -> Result<Vec<AuditEvent>, TrustError>;
}

/// Alert delivery
///
/// Delivery failures are logged by callers and not retried.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &SecurityAlert) -> Result<(), TrustError>;

    async fn get_alerts(&self, filter: &AlertFilter) -> Result<Vec<SecurityAlert>, TrustError>;
}
