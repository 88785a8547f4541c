// Core domain models: token claims, audit events, rules and alerts

use crate::constants::{audit, event_types, results, risk};
use crate::core::crypto;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Token type carried in the `typ` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Signed token payload
///
/// Serialized as a flat JSON object using registered claim names where one
/// exists (`jti`, `sub`, `iss`, `aud`, `iat`, `nbf`, `exp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Token id, unique per token
    #[serde(rename = "jti")]
    pub token_id: String,
    /// User id
    #[serde(rename = "sub")]
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Shared by the access and refresh token of one pair
    #[serde(rename = "sid")]
    pub session_id: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub device_id: String,
    #[serde(rename = "ip")]
    pub ip_address: String,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: String,
    /// Issued at (seconds since epoch)
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Not before (seconds since epoch)
    #[serde(rename = "nbf")]
    pub not_before: i64,
    /// Expiration (seconds since epoch)
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl TokenClaims {
    /// Expiration as a UTC timestamp
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Access / refresh token pair returned by issuance and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiration of the access token
    pub expires_at: DateTime<Utc>,
}

/// Revocation record keyed by token id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

impl BlacklistEntry {
    /// Whether the revoked token would have expired naturally by `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Multiplier applied to the base risk score
    pub fn factor(&self) -> i32 {
        match self {
            Severity::Info => risk::FACTOR_INFO,
            Severity::Warning => risk::FACTOR_WARNING,
            Severity::Error => risk::FACTOR_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Alert severity, set by the rule or pattern that raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Alert lifecycle state. Only OPEN is produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Open,
    Ack,
    Closed,
}

/// Caller-provided fields of an audit event
///
/// The pipeline turns a record into an [`AuditEvent`] by assigning id,
/// timestamp, risk score and fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub resource: String,
    pub action: String,
    pub result: String,
    pub details: Map<String, Value>,
}

impl EventRecord {
    pub fn new(event_type: impl Into<String>, severity: Severity) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Immutable security-relevant event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub resource: String,
    pub action: String,
    pub result: String,
    pub details: Map<String, Value>,
    pub risk_score: i32,
    pub fingerprint: String,
}

impl AuditEvent {
    /// Build an event from caller fields, assigning id, score and fingerprint
    pub fn from_record(record: EventRecord, timestamp: DateTime<Utc>) -> Self {
        let risk_score = risk_score(&record.event_type, record.severity, &record.result);
        let fingerprint = crypto::event_fingerprint(
            &record.event_type,
            &record.resource,
            &record.action,
            &record.ip_address,
        );

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type: record.event_type,
            severity: record.severity,
            user_id: record.user_id,
            session_id: record.session_id,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            resource: record.resource,
            action: record.action,
            result: record.result,
            details: record.details,
            risk_score,
            fingerprint,
        }
    }

    /// Resolve a field by name for rule evaluation
    ///
    /// Top-level fields win; any other name is looked up in `details`.
    /// Returns `None` when the field is absent or an optional field is unset.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "timestamp" => Some(Value::String(self.timestamp.to_rfc3339())),
            "event_type" => Some(Value::String(self.event_type.clone())),
            "severity" => Some(Value::String(self.severity.as_str().to_string())),
            "user_id" => self.user_id.clone().map(Value::String),
            "session_id" => self.session_id.clone().map(Value::String),
            "ip_address" => Some(Value::String(self.ip_address.clone())),
            "user_agent" => Some(Value::String(self.user_agent.clone())),
            "resource" => Some(Value::String(self.resource.clone())),
            "action" => Some(Value::String(self.action.clone())),
            "result" => Some(Value::String(self.result.clone())),
            "risk_score" => Some(Value::from(self.risk_score)),
            "fingerprint" => Some(Value::String(self.fingerprint.clone())),
            other => self.details.get(other).cloned(),
        }
    }

    pub fn is_failure(&self) -> bool {
        results::PENALIZED.contains(&self.result.as_str())
    }
}

/// Deterministic risk score of an event
///
/// `base(event_type) * factor(severity)`, plus a penalty when the result is
/// FAILURE, DENIED or BLOCKED.
pub fn risk_score(event_type: &str, severity: Severity, result: &str) -> i32 {
    let base = match event_type {
        event_types::AUTHENTICATION => risk::BASE_AUTHENTICATION,
        event_types::AUTHORIZATION => risk::BASE_AUTHORIZATION,
        event_types::DATA_ACCESS => risk::BASE_DATA_ACCESS,
        event_types::SECURITY_VIOLATION => risk::BASE_SECURITY_VIOLATION,
        _ => risk::BASE_OTHER,
    };

    let penalty = if results::PENALIZED.contains(&result) {
        risk::FAILURE_PENALTY
    } else {
        0
    };

    base * severity.factor() + penalty
}

/// Comparison operator of a rule condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
}

/// Single field condition of a security rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl RuleCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Declarative, time-windowed threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub id: String,
    pub name: String,
    pub event_types: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    pub threshold: u32,
    pub time_window_secs: u64,
    pub severity: AlertSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SecurityRule {
    pub fn time_window(&self) -> Duration {
        // chrono panics past i64::MAX milliseconds
        let max_secs = (i64::MAX / 1000) as u64;
        Duration::seconds(self.time_window_secs.min(max_secs) as i64)
    }
}

/// Alert raised by the rule engine or a threat pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub rule_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// Sample of the events that triggered the alert (at most 10)
    pub events: Vec<AuditEvent>,
    pub status: AlertStatus,
}

impl SecurityAlert {
    /// Create an OPEN alert, keeping at most the first 10 sample events
    pub fn new(
        rule_id: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
        mut events: Vec<AuditEvent>,
    ) -> Self {
        events.truncate(audit::MAX_ALERT_SAMPLE_EVENTS);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            events,
            status: AlertStatus::Open,
        }
    }
}

/// Filter for querying stored audit events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub result: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(ref event_type) = self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if event.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        if let Some(ref ip) = self.ip_address {
            if &event.ip_address != ip {
                return false;
            }
        }
        if let Some(ref result) = self.result {
            if &event.result != result {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Filter for querying delivered alerts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub rule_id: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub status: Option<AlertStatus>,
    pub since: Option<DateTime<Utc>>,
}

impl AlertFilter {
    pub fn for_rule(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: Some(rule_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, alert: &SecurityAlert) -> bool {
        self.rule_id.as_ref().map_or(true, |id| &alert.rule_id == id)
            && self.severity.map_or(true, |s| alert.severity == s)
            && self.status.map_or(true, |s| alert.status == s)
            && self.since.map_or(true, |since| alert.timestamp >= since)
    }
}
