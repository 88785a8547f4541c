// Per-IP and per-user risk accumulation

use crate::constants::audit;
use crate::core::errors::TrustError;
use crate::core::models::AuditEvent;
use chrono::Duration;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Which map a risk entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskScope {
    Ip,
    User,
}

/// Rolling history and accumulated score for one IP or user
#[derive(Debug, Clone, Serialize)]
pub struct RiskEntry {
    pub key: String,
    /// Sum of all threat deltas; never decays
    pub accumulated_risk_score: i64,
    /// Oldest first, bounded by count and age
    pub recent_events: VecDeque<AuditEvent>,
}

impl RiskEntry {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            accumulated_risk_score: 0,
            recent_events: VecDeque::new(),
        }
    }

    fn push(&mut self, event: &AuditEvent) {
        self.recent_events.push_back(event.clone());

        let cutoff = event.timestamp - Duration::seconds(audit::RECENT_EVENT_WINDOW_SECS);
        while self
            .recent_events
            .front()
            .map_or(false, |e| e.timestamp < cutoff)
        {
            self.recent_events.pop_front();
        }
        while self.recent_events.len() > audit::MAX_RECENT_EVENTS {
            self.recent_events.pop_front();
        }
    }
}

type RiskMap = HashMap<String, RiskEntry>;

/// Risk state shared by the threat detector and reporting paths
///
/// Written by the audit consumer only; reads may come from anywhere.
#[derive(Default)]
pub struct RiskTracker {
    by_ip: RwLock<RiskMap>,
    by_user: RwLock<RiskMap>,
}

impl RiskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the history of its IP and user
    ///
    /// Empty IPs and absent users are not tracked.
    pub fn record_event(&self, event: &AuditEvent) -> Result<(), TrustError> {
        if !event.ip_address.is_empty() {
            self.write(RiskScope::Ip)?
                .entry(event.ip_address.clone())
                .or_insert_with(|| RiskEntry::new(&event.ip_address))
                .push(event);
        }
        if let Some(user_id) = event.user_id.as_deref().filter(|u| !u.is_empty()) {
            self.write(RiskScope::User)?
                .entry(user_id.to_string())
                .or_insert_with(|| RiskEntry::new(user_id))
                .push(event);
        }
        Ok(())
    }

    /// Add `delta` to an entry, returning the new total
    pub fn add_risk(&self, scope: RiskScope, key: &str, delta: i64) -> Result<i64, TrustError> {
        let mut map = self.write(scope)?;
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| RiskEntry::new(key));
        entry.accumulated_risk_score = entry.accumulated_risk_score.saturating_add(delta);
        Ok(entry.accumulated_risk_score)
    }

    pub fn add_risk_to_ip(&self, ip_address: &str, delta: i64) -> Result<i64, TrustError> {
        self.add_risk(RiskScope::Ip, ip_address, delta)
    }

    pub fn add_risk_to_user(&self, user_id: &str, delta: i64) -> Result<i64, TrustError> {
        self.add_risk(RiskScope::User, user_id, delta)
    }

    /// Accumulated score, zero for unknown keys
    pub fn risk(&self, scope: RiskScope, key: &str) -> Result<i64, TrustError> {
        Ok(self
            .read(scope)?
            .get(key)
            .map_or(0, |e| e.accumulated_risk_score))
    }

    pub fn ip_risk(&self, ip_address: &str) -> Result<i64, TrustError> {
        self.risk(RiskScope::Ip, ip_address)
    }

    pub fn user_risk(&self, user_id: &str) -> Result<i64, TrustError> {
        self.risk(RiskScope::User, user_id)
    }

    /// Recent events of an entry, oldest first
    pub fn recent_events(&self, scope: RiskScope, key: &str) -> Result<Vec<AuditEvent>, TrustError> {
        Ok(self
            .read(scope)?
            .get(key)
            .map(|e| e.recent_events.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn snapshot(&self, scope: RiskScope, key: &str) -> Result<Option<RiskEntry>, TrustError> {
        Ok(self.read(scope)?.get(key).cloned())
    }

    /// Highest-scoring IPs, descending; ties ordered by IP
    pub fn top_risky_ips(&self, n: usize) -> Result<Vec<(String, i64)>, TrustError> {
        let mut scores: Vec<(String, i64)> = self
            .read(RiskScope::Ip)?
            .values()
            .filter(|e| e.accumulated_risk_score > 0)
            .map(|e| (e.key.clone(), e.accumulated_risk_score))
            .collect();
        scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(n);
        Ok(scores)
    }

    fn map(&self, scope: RiskScope) -> &RwLock<RiskMap> {
        match scope {
            RiskScope::Ip => &self.by_ip,
            RiskScope::User => &self.by_user,
        }
    }

    fn read(&self, scope: RiskScope) -> Result<RwLockReadGuard<'_, RiskMap>, TrustError> {
        self.map(scope)
            .read()
            .map_err(|_| TrustError::StateError("Risk tracker lock poisoned".to_string()))
    }

    fn write(&self, scope: RiskScope) -> Result<RwLockWriteGuard<'_, RiskMap>, TrustError> {
        self.map(scope)
            .write()
            .map_err(|_| TrustError::StateError("Risk tracker lock poisoned".to_string()))
    }
}
