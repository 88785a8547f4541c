// Declarative threshold rules over stored audit events

use crate::core::errors::TrustError;
use crate::core::models::{AuditEvent, ConditionOperator, RuleCondition, SecurityAlert, SecurityRule};
use crate::state::{AlertSink, AuditStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Evaluate one condition against an event
///
/// An absent field makes the condition false. Ordering operators on
/// non-numeric operands are a rule error.
pub fn condition_holds(condition: &RuleCondition, event: &AuditEvent) -> Result<bool, TrustError> {
    let actual = match event.field_value(&condition.field) {
        Some(v) => v,
        None => return Ok(false),
    };

    match condition.operator {
        ConditionOperator::Equals => Ok(values_equal(&actual, &condition.value)),
        ConditionOperator::NotEquals => Ok(!values_equal(&actual, &condition.value)),
        ConditionOperator::Contains => Ok(match (&actual, &condition.value) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
            _ => false,
        }),
        ConditionOperator::GreaterThan => {
            let (a, b) = numeric_operands(condition, &actual)?;
            Ok(a > b)
        }
        ConditionOperator::LessThan => {
            let (a, b) = numeric_operands(condition, &actual)?;
            Ok(a < b)
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn numeric_operands(condition: &RuleCondition, actual: &Value) -> Result<(f64, f64), TrustError> {
    match (actual.as_f64(), condition.value.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(TrustError::ConfigurationError(format!(
            "Non-numeric operand for {:?} on field '{}'",
            condition.operator, condition.field
        ))),
    }
}

/// Whether an event is in scope for a rule (type and all conditions)
pub fn rule_matches(rule: &SecurityRule, event: &AuditEvent) -> Result<bool, TrustError> {
    if !rule.event_types.iter().any(|t| t == &event.event_type) {
        return Ok(false);
    }
    for condition in &rule.conditions {
        if !condition_holds(condition, event)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluates security rules against each processed event
pub struct RuleEngine {
    rules: RwLock<Vec<SecurityRule>>,
    store: Arc<dyn AuditStore>,
    sink: Arc<dyn AlertSink>,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn AuditStore>, sink: Arc<dyn AlertSink>, rules: Vec<SecurityRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            store,
            sink,
        }
    }

    pub fn rules(&self) -> Result<Vec<SecurityRule>, TrustError> {
        Ok(self.read_rules()?.clone())
    }

    /// Add a rule, replacing any rule with the same id
    pub fn upsert_rule(&self, rule: SecurityRule) -> Result<(), TrustError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| TrustError::StateError("Rule set lock poisoned".to_string()))?;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        Ok(())
    }

    pub fn remove_rule(&self, rule_id: &str) -> Result<bool, TrustError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| TrustError::StateError("Rule set lock poisoned".to_string()))?;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        Ok(rules.len() != before)
    }

    /// Evaluate all enabled rules against `event`
    ///
    /// A failing rule is logged and skipped. Returns the alerts raised.
    pub async fn evaluate(&self, event: &AuditEvent) -> Result<Vec<SecurityAlert>, TrustError> {
        self.evaluate_at(event, Utc::now()).await
    }

    /// Evaluate with the window ending at `now`
    pub async fn evaluate_at(
        &self,
        event: &AuditEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<SecurityAlert>, TrustError> {
        let rules: Vec<SecurityRule> = self
            .read_rules()?
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect();

        let mut alerts = Vec::new();
        for rule in &rules {
            match self.evaluate_rule(rule, event, now).await {
                Ok(Some(alert)) => {
                    if let Err(e) = self.sink.send_alert(&alert).await {
                        warn!(alert_id = %alert.id, rule_id = %rule.id, error = %e, "Alert delivery failed");
                    }
                    alerts.push(alert);
                }
                Ok(None) => {}
                Err(e) => warn!(rule_id = %rule.id, event_id = %event.id, error = %e, "Security rule evaluation failed"),
            }
        }
        Ok(alerts)
    }

    async fn evaluate_rule(
        &self,
        rule: &SecurityRule,
        event: &AuditEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<SecurityAlert>, TrustError> {
        if !rule_matches(rule, event)? {
            return Ok(None);
        }

        let window_start = now - rule.time_window();
        let candidates = self.store.events_by_time_range(window_start, now).await?;

        let mut matching = Vec::new();
        for candidate in candidates {
            if rule_matches(rule, &candidate)? {
                matching.push(candidate);
            }
        }

        let count = matching.len();
        debug!(rule_id = %rule.id, count = count, threshold = rule.threshold, "Security rule evaluated");

        if count < rule.threshold as usize {
            return Ok(None);
        }

        let message = format!(
            "{}: {} matching events in the last {}s (threshold {})",
            rule.name, count, rule.time_window_secs, rule.threshold
        );
        Ok(Some(SecurityAlert::new(rule.id.clone(), rule.severity, message, matching)))
    }

    fn read_rules(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<SecurityRule>>, TrustError> {
        self.rules
            .read()
            .map_err(|_| TrustError::StateError("Rule set lock poisoned".to_string()))
    }
}
