// YAML security rule loading - rules.yaml with threshold rule definitions

use crate::constants::event_types;
use crate::core::errors::TrustError;
use crate::core::models::{AlertSeverity, ConditionOperator, RuleCondition, SecurityRule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Container for rules.yaml root structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RulesYaml {
    rules: Vec<SecurityRule>,
}

/// Rule loader - parses and validates security rule sets
pub struct RuleLoader {
    rules: Vec<SecurityRule>,
}

impl RuleLoader {
    /// Load rules from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TrustError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(TrustError::ConfigurationError(format!(
                "Rules file not found at {:?}",
                path_ref
            )));
        }

        let yaml_content = fs::read_to_string(path_ref)
            .map_err(|e| TrustError::ConfigurationError(format!("Failed to read rules file: {}", e)))?;

        Self::from_yaml(&yaml_content)
    }

    /// Parse rules from YAML text
    pub fn from_yaml(yaml_content: &str) -> Result<Self, TrustError> {
        let rules_yaml: RulesYaml = serde_yaml::from_str(yaml_content)
            .map_err(|e| TrustError::ConfigurationError(format!("Failed to parse rules YAML: {}", e)))?;

        let loader = Self {
            rules: rules_yaml.rules,
        };
        loader.validate()?;
        Ok(loader)
    }

    /// Built-in rule set used when no rules file is configured
    pub fn with_defaults() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<SecurityRule> {
        self.rules
    }

    /// Reject duplicate ids, empty event type lists and zero thresholds or windows
    pub fn validate(&self) -> Result<(), TrustError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(TrustError::ConfigurationError(format!(
                    "Duplicate rule id '{}'",
                    rule.id
                )));
            }
            if rule.event_types.is_empty() {
                return Err(TrustError::ConfigurationError(format!(
                    "Rule '{}' has no event types",
                    rule.id
                )));
            }
            if rule.threshold == 0 {
                return Err(TrustError::ConfigurationError(format!(
                    "Rule '{}' threshold must be greater than 0",
                    rule.id
                )));
            }
            if rule.time_window_secs == 0 {
                return Err(TrustError::ConfigurationError(format!(
                    "Rule '{}' time window must be greater than 0",
                    rule.id
                )));
            }
        }
        Ok(())
    }
}

/// Default security rules
pub fn default_rules() -> Vec<SecurityRule> {
    vec![
        SecurityRule {
            id: "brute_force_login".to_string(),
            name: "Brute force login".to_string(),
            event_types: vec![event_types::AUTHENTICATION.to_string()],
            conditions: vec![RuleCondition::new("result", ConditionOperator::Equals, "FAILURE")],
            threshold: 5,
            time_window_secs: 15 * 60,
            severity: AlertSeverity::High,
            enabled: true,
        },
        SecurityRule {
            id: "repeated_authorization_denials".to_string(),
            name: "Repeated authorization denials".to_string(),
            event_types: vec![event_types::AUTHORIZATION.to_string()],
            conditions: vec![RuleCondition::new("result", ConditionOperator::Equals, "DENIED")],
            threshold: 10,
            time_window_secs: 10 * 60,
            severity: AlertSeverity::Medium,
            enabled: true,
        },
        SecurityRule {
            id: "security_violation".to_string(),
            name: "Security violation".to_string(),
            event_types: vec![event_types::SECURITY_VIOLATION.to_string()],
            conditions: Vec::new(),
            threshold: 1,
            time_window_secs: 5 * 60,
            severity: AlertSeverity::Critical,
            enabled: true,
        },
        SecurityRule {
            id: "bulk_data_access".to_string(),
            name: "Bulk data access".to_string(),
            event_types: vec![event_types::DATA_ACCESS.to_string()],
            conditions: Vec::new(),
            threshold: 100,
            time_window_secs: 5 * 60,
            severity: AlertSeverity::High,
            enabled: true,
        },
    ]
}
