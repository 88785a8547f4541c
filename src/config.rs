// Configuration management

use crate::audit::PipelineConfig;
use crate::auth::token_service::TokenConfig;
use crate::constants::{config as keys, defaults};
use crate::core::crypto::PasswordHashParams;
use crate::core::errors::TrustError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration loaded from environment variables
///
/// All configuration is validated on load with clear error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Token configuration
    pub token_issuer: String,
    pub token_audience: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,

    // Signing keys
    pub key_rotation_interval_secs: u64,
    /// PKCS#8 PEM file for the initial signing key; generated when unset
    pub signing_key_path: Option<PathBuf>,

    // Audit pipeline
    pub audit_queue_capacity: usize,
    pub audit_store_max_events: usize,
    pub security_rules_yaml_path: Option<PathBuf>,
    pub storage_failure_threshold: u32,
    pub storage_cooldown_secs: u64,

    // Password hashing (Argon2id)
    pub password_memory_kib: u32,
    pub password_iterations: u32,
    pub password_parallelism: u32,

    // Revocation and housekeeping
    pub blacklist_max_capacity: u64,
    pub maintenance_interval_secs: u64,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    /// Validates all fields and file paths.
    pub fn from_env() -> Result<Self, TrustError> {
        // Skip in test environment to avoid interfering with test environment variables
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // Ignore errors (file may not exist)
        }

        let config = Self {
            token_issuer: Self::get_env_or_default(keys::ENV_TOKEN_ISSUER, defaults::TOKEN_ISSUER)?,
            token_audience: Self::get_env_or_default(keys::ENV_TOKEN_AUDIENCE, defaults::TOKEN_AUDIENCE)?,
            access_token_ttl_secs: Self::parse_or_default(
                keys::ENV_ACCESS_TOKEN_TTL_SECS,
                defaults::ACCESS_TOKEN_TTL_SECS,
            )?,
            refresh_token_ttl_secs: Self::parse_or_default(
                keys::ENV_REFRESH_TOKEN_TTL_SECS,
                defaults::REFRESH_TOKEN_TTL_SECS,
            )?,
            key_rotation_interval_secs: Self::parse_or_default(
                keys::ENV_KEY_ROTATION_INTERVAL_SECS,
                defaults::KEY_ROTATION_INTERVAL_SECS,
            )?,
            signing_key_path: Self::get_optional_path(keys::ENV_SIGNING_KEY_PATH)?,
            audit_queue_capacity: Self::parse_or_default(
                keys::ENV_AUDIT_QUEUE_CAPACITY,
                defaults::AUDIT_QUEUE_CAPACITY,
            )?,
            audit_store_max_events: Self::parse_or_default(
                keys::ENV_AUDIT_STORE_MAX_EVENTS,
                defaults::AUDIT_STORE_MAX_EVENTS,
            )?,
            security_rules_yaml_path: Self::get_optional_path(keys::ENV_SECURITY_RULES_YAML_PATH)?,
            storage_failure_threshold: Self::parse_or_default(
                keys::ENV_STORAGE_FAILURE_THRESHOLD,
                defaults::STORAGE_FAILURE_THRESHOLD,
            )?,
            storage_cooldown_secs: Self::parse_or_default(
                keys::ENV_STORAGE_COOLDOWN_SECS,
                defaults::STORAGE_COOLDOWN_SECS,
            )?,
            password_memory_kib: Self::parse_or_default(
                keys::ENV_PASSWORD_MEMORY_KIB,
                defaults::PASSWORD_MEMORY_KIB,
            )?,
            password_iterations: Self::parse_or_default(
                keys::ENV_PASSWORD_ITERATIONS,
                defaults::PASSWORD_ITERATIONS,
            )?,
            password_parallelism: Self::parse_or_default(
                keys::ENV_PASSWORD_PARALLELISM,
                defaults::PASSWORD_PARALLELISM,
            )?,
            blacklist_max_capacity: Self::parse_or_default(
                keys::ENV_BLACKLIST_MAX_CAPACITY,
                defaults::BLACKLIST_MAX_CAPACITY,
            )?,
            maintenance_interval_secs: Self::parse_or_default(
                keys::ENV_MAINTENANCE_INTERVAL_SECS,
                defaults::MAINTENANCE_INTERVAL_SECS,
            )?,
            log_level: Self::get_env_or_default(keys::ENV_LOG_LEVEL, "info")?,
            log_format: Self::get_env_or_default(keys::ENV_LOG_FORMAT, "json")?,
        };

        // Post-load validation
        config.validate()?;

        Ok(config)
    }

    /// Token issuer, audience and lifetimes
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            issuer: self.token_issuer.clone(),
            audience: self.token_audience.clone(),
            access_ttl: seconds(self.access_token_ttl_secs),
            refresh_ttl: seconds(self.refresh_token_ttl_secs),
        }
    }

    pub fn key_rotation_interval(&self) -> chrono::Duration {
        seconds(self.key_rotation_interval_secs)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.audit_queue_capacity,
            storage_failure_threshold: self.storage_failure_threshold,
            storage_cooldown: Duration::from_secs(self.storage_cooldown_secs),
        }
    }

    pub fn password_params(&self) -> PasswordHashParams {
        PasswordHashParams {
            memory_kib: self.password_memory_kib,
            iterations: self.password_iterations,
            parallelism: self.password_parallelism,
        }
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Get environment variable or return default value
    fn get_env_or_default(key: &str, default: &str) -> Result<String, TrustError> {
        Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
    }

    /// Get optional file path from environment variable
    fn get_optional_path(key: &str) -> Result<Option<PathBuf>, TrustError> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Ok(Some(PathBuf::from(value))),
            _ => Ok(None),
        }
    }

    /// Parse a positive number from an environment variable or return default
    fn parse_or_default<T>(key: &str, default: T) -> Result<T, TrustError>
    where
        T: std::str::FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.trim().parse::<T>().map_err(|e| {
                    TrustError::ConfigurationError(format!("Invalid {} value '{}': {}", key, value, e))
                })?;

                if parsed == T::default() {
                    return Err(TrustError::ConfigurationError(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), TrustError> {
        if self.token_issuer.is_empty() {
            return Err(TrustError::ConfigurationError(format!(
                "{} must not be empty",
                keys::ENV_TOKEN_ISSUER
            )));
        }
        if self.token_audience.is_empty() {
            return Err(TrustError::ConfigurationError(format!(
                "{} must not be empty",
                keys::ENV_TOKEN_AUDIENCE
            )));
        }

        if self.access_token_ttl_secs >= self.refresh_token_ttl_secs {
            return Err(TrustError::ConfigurationError(format!(
                "{} ({}) must be less than {} ({})",
                keys::ENV_ACCESS_TOKEN_TTL_SECS,
                self.access_token_ttl_secs,
                keys::ENV_REFRESH_TOKEN_TTL_SECS,
                self.refresh_token_ttl_secs
            )));
        }

        // Validate optional file paths
        if let Some(ref path) = self.signing_key_path {
            Self::validate_file_path(path, "Signing key file")?;
        }
        if let Some(ref path) = self.security_rules_yaml_path {
            Self::validate_file_path(path, "Security rules YAML file")?;
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    /// Validate that a file path exists and is readable
    fn validate_file_path(path: &Path, description: &str) -> Result<(), TrustError> {
        if !path.exists() {
            return Err(TrustError::ConfigurationError(format!(
                "{} not found at {:?}",
                description, path
            )));
        }

        if !path.is_file() {
            return Err(TrustError::ConfigurationError(format!(
                "{} is not a file: {:?}",
                description, path
            )));
        }

        std::fs::File::open(path).map_err(|e| {
            TrustError::ConfigurationError(format!("Cannot read {} at {:?}: {}", description, path, e))
        })?;

        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), TrustError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(TrustError::ConfigurationError(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), TrustError> {
        if format != "json" && format != "text" {
            return Err(TrustError::ConfigurationError(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }
}

/// Seconds as a chrono duration, saturating at chrono's range
fn seconds(secs: u64) -> chrono::Duration {
    let max_secs = (i64::MAX / 1000) as u64;
    chrono::Duration::seconds(secs.min(max_secs) as i64)
}

impl Config {
    /// Create a test configuration for unit tests
    ///
    /// This bypasses environment variable loading and file validation.
    /// Password hashing uses cheap parameters.
    pub fn test_config() -> Self {
        Self {
            token_issuer: defaults::TOKEN_ISSUER.to_string(),
            token_audience: defaults::TOKEN_AUDIENCE.to_string(),
            access_token_ttl_secs: defaults::ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: defaults::REFRESH_TOKEN_TTL_SECS,
            key_rotation_interval_secs: defaults::KEY_ROTATION_INTERVAL_SECS,
            signing_key_path: None,
            audit_queue_capacity: 64,
            audit_store_max_events: 10_000,
            security_rules_yaml_path: None,
            storage_failure_threshold: defaults::STORAGE_FAILURE_THRESHOLD,
            storage_cooldown_secs: defaults::STORAGE_COOLDOWN_SECS,
            password_memory_kib: 1024,
            password_iterations: 1,
            password_parallelism: 1,
            blacklist_max_capacity: 1_000,
            maintenance_interval_secs: defaults::MAINTENANCE_INTERVAL_SECS,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}
