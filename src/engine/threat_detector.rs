// Named threat patterns evaluated against each audit event

use crate::constants::{audit, event_types, results, threat};
use crate::core::errors::TrustError;
use crate::core::models::{AlertSeverity, AuditEvent, SecurityAlert};
use crate::engine::risk_tracker::{RiskScope, RiskTracker};
use crate::state::AlertSink;
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-only view handed to patterns
pub struct ThreatContext<'a> {
    pub tracker: &'a RiskTracker,
}

impl ThreatContext<'_> {
    /// Tracked events of `key` within `window_secs` of `event`, matching `predicate`
    fn recent_matching<F>(
        &self,
        scope: RiskScope,
        key: &str,
        event: &AuditEvent,
        window_secs: i64,
        predicate: F,
    ) -> Result<Vec<AuditEvent>, TrustError>
    where
        F: Fn(&AuditEvent) -> bool,
    {
        let since = event.timestamp - Duration::seconds(window_secs);
        Ok(self
            .tracker
            .recent_events(scope, key)?
            .into_iter()
            .filter(|e| e.timestamp >= since && predicate(e))
            .collect())
    }
}

/// Outcome of one pattern on one event
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub matched: bool,
    pub risk_delta: i64,
    pub severity: AlertSeverity,
    pub message: String,
    /// Events supporting the match, attached to the alert
    pub evidence: Vec<AuditEvent>,
}

impl PatternMatch {
    pub fn none() -> Self {
        Self {
            matched: false,
            risk_delta: 0,
            severity: AlertSeverity::Low,
            message: String::new(),
            evidence: Vec::new(),
        }
    }

    pub fn hit(
        risk_delta: i64,
        severity: AlertSeverity,
        message: impl Into<String>,
        evidence: Vec<AuditEvent>,
    ) -> Self {
        Self {
            matched: true,
            risk_delta,
            severity,
            message: message.into(),
            evidence,
        }
    }
}

/// A named detection heuristic
pub trait ThreatPattern: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, event: &AuditEvent, ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError>;
}

fn is_auth_failure(e: &AuditEvent) -> bool {
    e.event_type == event_types::AUTHENTICATION && e.is_failure()
}

/// Repeated authentication failures from one IP
pub struct BruteForcePattern;

impl ThreatPattern for BruteForcePattern {
    fn name(&self) -> &str {
        "brute_force"
    }

    fn evaluate(&self, event: &AuditEvent, ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError> {
        if !is_auth_failure(event) || event.ip_address.is_empty() {
            return Ok(PatternMatch::none());
        }

        let failures = ctx.recent_matching(
            RiskScope::Ip,
            &event.ip_address,
            event,
            threat::BRUTE_FORCE_WINDOW_SECS,
            is_auth_failure,
        )?;

        if failures.len() < threat::BRUTE_FORCE_THRESHOLD {
            return Ok(PatternMatch::none());
        }

        Ok(PatternMatch::hit(
            threat::BRUTE_FORCE_RISK,
            AlertSeverity::High,
            format!(
                "{} authentication failures from {} within {}s",
                failures.len(),
                event.ip_address,
                threat::BRUTE_FORCE_WINDOW_SECS
            ),
            failures,
        ))
    }
}

/// Authentication failures against many distinct accounts from one IP
pub struct CredentialStuffingPattern;

impl ThreatPattern for CredentialStuffingPattern {
    fn name(&self) -> &str {
        "credential_stuffing"
    }

    fn evaluate(&self, event: &AuditEvent, ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError> {
        if !is_auth_failure(event) || event.ip_address.is_empty() {
            return Ok(PatternMatch::none());
        }

        let failures = ctx.recent_matching(
            RiskScope::Ip,
            &event.ip_address,
            event,
            threat::CREDENTIAL_STUFFING_WINDOW_SECS,
            is_auth_failure,
        )?;

        let users: HashSet<&str> = failures.iter().filter_map(|e| e.user_id.as_deref()).collect();
        if users.len() < threat::CREDENTIAL_STUFFING_DISTINCT_USERS {
            return Ok(PatternMatch::none());
        }

        let message = format!(
            "Authentication failures for {} distinct users from {}",
            users.len(),
            event.ip_address
        );
        Ok(PatternMatch::hit(
            threat::CREDENTIAL_STUFFING_RISK,
            AlertSeverity::High,
            message,
            failures,
        ))
    }
}

/// Repeated authorization denials for one user
pub struct PrivilegeEscalationPattern;

impl ThreatPattern for PrivilegeEscalationPattern {
    fn name(&self) -> &str {
        "privilege_escalation"
    }

    fn evaluate(&self, event: &AuditEvent, ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError> {
        let is_denial =
            |e: &AuditEvent| e.event_type == event_types::AUTHORIZATION && e.result == results::DENIED;

        let user_id = match event.user_id.as_deref() {
            Some(u) if is_denial(event) => u,
            _ => return Ok(PatternMatch::none()),
        };

        let denials = ctx.recent_matching(
            RiskScope::User,
            user_id,
            event,
            threat::PRIVILEGE_ESCALATION_WINDOW_SECS,
            is_denial,
        )?;

        if denials.len() < threat::PRIVILEGE_ESCALATION_THRESHOLD {
            return Ok(PatternMatch::none());
        }

        let message = format!("{} authorization denials for user {}", denials.len(), user_id);
        Ok(PatternMatch::hit(
            threat::PRIVILEGE_ESCALATION_RISK,
            AlertSeverity::Medium,
            message,
            denials,
        ))
    }
}

/// Bulk data access by one user
pub struct DataExfiltrationPattern;

impl ThreatPattern for DataExfiltrationPattern {
    fn name(&self) -> &str {
        "data_exfiltration"
    }

    fn evaluate(&self, event: &AuditEvent, ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError> {
        let is_access = |e: &AuditEvent| e.event_type == event_types::DATA_ACCESS;

        let user_id = match event.user_id.as_deref() {
            Some(u) if is_access(event) => u,
            _ => return Ok(PatternMatch::none()),
        };

        let accesses = ctx.recent_matching(
            RiskScope::User,
            user_id,
            event,
            threat::DATA_EXFILTRATION_WINDOW_SECS,
            is_access,
        )?;

        if accesses.len() < threat::DATA_EXFILTRATION_THRESHOLD {
            return Ok(PatternMatch::none());
        }

        let message = format!(
            "{} data access events for user {} within {}s",
            accesses.len(),
            user_id,
            threat::DATA_EXFILTRATION_WINDOW_SECS
        );
        Ok(PatternMatch::hit(
            threat::DATA_EXFILTRATION_RISK,
            AlertSeverity::High,
            message,
            accesses,
        ))
    }
}

/// Any explicit security violation
pub struct SecurityViolationPattern;

impl ThreatPattern for SecurityViolationPattern {
    fn name(&self) -> &str {
        "security_violation"
    }

    fn evaluate(&self, event: &AuditEvent, _ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError> {
        if event.event_type != event_types::SECURITY_VIOLATION {
            return Ok(PatternMatch::none());
        }

        Ok(PatternMatch::hit(
            threat::SECURITY_VIOLATION_RISK,
            AlertSeverity::Critical,
            format!(
                "Security violation on {} ({}) from {}",
                event.resource, event.action, event.ip_address
            ),
            vec![event.clone()],
        ))
    }
}

/// Activity from an IP whose accumulated risk is already high
pub struct HighRiskSourcePattern;

impl ThreatPattern for HighRiskSourcePattern {
    fn name(&self) -> &str {
        "high_risk_source"
    }

    fn evaluate(&self, event: &AuditEvent, ctx: &ThreatContext<'_>) -> Result<PatternMatch, TrustError> {
        if event.ip_address.is_empty() {
            return Ok(PatternMatch::none());
        }

        let score = ctx.tracker.ip_risk(&event.ip_address)?;
        if score < threat::HIGH_RISK_SOURCE_LIMIT {
            return Ok(PatternMatch::none());
        }

        Ok(PatternMatch::hit(
            threat::HIGH_RISK_SOURCE_RISK,
            AlertSeverity::Medium,
            format!("Activity from high-risk source {} (risk {})", event.ip_address, score),
            vec![event.clone()],
        ))
    }
}

/// The built-in pattern set, in evaluation order
pub fn builtin_patterns() -> Vec<Box<dyn ThreatPattern>> {
    vec![
        Box::new(BruteForcePattern),
        Box::new(CredentialStuffingPattern),
        Box::new(PrivilegeEscalationPattern),
        Box::new(DataExfiltrationPattern),
        Box::new(SecurityViolationPattern),
        Box::new(HighRiskSourcePattern),
    ]
}

/// Runs every pattern on every event and applies the resulting risk
pub struct ThreatDetector {
    patterns: Vec<Box<dyn ThreatPattern>>,
    tracker: Arc<RiskTracker>,
    sink: Arc<dyn AlertSink>,
}

impl ThreatDetector {
    /// Detector with the built-in patterns
    pub fn new(tracker: Arc<RiskTracker>, sink: Arc<dyn AlertSink>) -> Self {
        Self::with_patterns(tracker, sink, builtin_patterns())
    }

    pub fn with_patterns(
        tracker: Arc<RiskTracker>,
        sink: Arc<dyn AlertSink>,
        patterns: Vec<Box<dyn ThreatPattern>>,
    ) -> Self {
        Self {
            patterns,
            tracker,
            sink,
        }
    }

    pub fn tracker(&self) -> &Arc<RiskTracker> {
        &self.tracker
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name()).collect()
    }

    /// Record the event, evaluate all patterns and raise alerts
    ///
    /// Every pattern sees the same tracker state; deltas are applied after
    /// all patterns ran. A failing pattern is logged and skipped. Returns the
    /// alerts raised, whether or not delivery succeeded.
    pub async fn analyze(&self, event: &AuditEvent) -> Result<Vec<SecurityAlert>, TrustError> {
        self.tracker.record_event(event)?;

        let ctx = ThreatContext {
            tracker: &self.tracker,
        };

        let mut hits = Vec::new();
        for pattern in &self.patterns {
            match pattern.evaluate(event, &ctx) {
                Ok(m) if m.matched => hits.push((pattern.name(), m)),
                Ok(_) => {}
                Err(e) => warn!(
                    pattern = pattern.name(),
                    event_id = %event.id,
                    error = %e,
                    "Threat pattern evaluation failed"
                ),
            }
        }

        let mut alerts = Vec::with_capacity(hits.len());
        for (name, m) in hits {
            debug!(pattern = name, risk_delta = m.risk_delta, event_id = %event.id, "Threat pattern matched");

            let alert = SecurityAlert::new(
                format!("{}{}", audit::THREAT_RULE_PREFIX, name),
                m.severity,
                m.message,
                m.evidence,
            );

            if let Err(e) = self.sink.send_alert(&alert).await {
                warn!(alert_id = %alert.id, rule_id = %alert.rule_id, error = %e, "Alert delivery failed");
            }

            if !event.ip_address.is_empty() {
                self.tracker.add_risk_to_ip(&event.ip_address, m.risk_delta)?;
            }
            if let Some(user_id) = event.user_id.as_deref().filter(|u| !u.is_empty()) {
                self.tracker.add_risk_to_user(user_id, m.risk_delta)?;
            }

            alerts.push(alert);
        }

        Ok(alerts)
    }
}
