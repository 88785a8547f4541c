//! Sentinel Trust Constants - Single source of truth for scoring tables and defaults.
//!
//! This module centralizes magic numbers, wire names and configuration
//! defaults so that scoring stays compatible across deployments.

/// Audit event type names
pub mod event_types {
    pub const AUTHENTICATION: &str = "AUTHENTICATION";
    pub const AUTHORIZATION: &str = "AUTHORIZATION";
    pub const DATA_ACCESS: &str = "DATA_ACCESS";
    pub const SECURITY_VIOLATION: &str = "SECURITY_VIOLATION";
}

/// Audit event result names
pub mod results {
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAILURE: &str = "FAILURE";
    pub const DENIED: &str = "DENIED";
    pub const BLOCKED: &str = "BLOCKED";

    /// Results that add the failure penalty to the risk score
    pub const PENALIZED: [&str; 3] = [FAILURE, DENIED, BLOCKED];
}

/// Risk scoring table. Changing these breaks score compatibility.
pub mod risk {
    pub const BASE_AUTHENTICATION: i32 = 10;
    pub const BASE_AUTHORIZATION: i32 = 15;
    pub const BASE_DATA_ACCESS: i32 = 20;
    pub const BASE_SECURITY_VIOLATION: i32 = 50;
    pub const BASE_OTHER: i32 = 5;

    pub const FACTOR_INFO: i32 = 1;
    pub const FACTOR_WARNING: i32 = 2;
    pub const FACTOR_ERROR: i32 = 3;

    /// Added when the result is FAILURE, DENIED or BLOCKED
    pub const FAILURE_PENALTY: i32 = 20;
}

/// Token format constants
pub mod token {
    /// JWS algorithm name for Ed25519
    pub const ALGORITHM: &str = "EdDSA";
    /// JWS type header
    pub const TYPE: &str = "JWT";
    /// Length of generated token ids (jti)
    pub const TOKEN_ID_LENGTH: usize = 32;
    /// Length of the random part of key ids
    pub const KEY_ID_LENGTH: usize = 16;
    /// Prefix for generated key ids
    pub const KEY_ID_PREFIX: &str = "key_";
    /// Generations held by the key registry (active + previous)
    pub const RETAINED_KEY_GENERATIONS: usize = 2;
}

/// Cryptographic constants
pub mod crypto {
    /// Symmetric key length for ChaCha20-Poly1305
    pub const SYMMETRIC_KEY_LENGTH: usize = 32;
    /// AEAD nonce length
    pub const NONCE_LENGTH: usize = 12;
    /// Password salt length
    pub const SALT_LENGTH: usize = 16;
    /// Password hash output length
    pub const PASSWORD_HASH_LENGTH: usize = 32;
    /// Algorithm label stored alongside password hashes
    pub const PASSWORD_ALGORITHM: &str = "argon2id";
}

/// Audit and detection limits
pub mod audit {
    /// Maximum sample events attached to an alert
    pub const MAX_ALERT_SAMPLE_EVENTS: usize = 10;
    /// Recent events kept per IP / user in the risk tracker
    pub const MAX_RECENT_EVENTS: usize = 200;
    /// How far back the risk tracker keeps recent events (seconds)
    pub const RECENT_EVENT_WINDOW_SECS: i64 = 3600;
    /// Rule id prefix for alerts raised by threat patterns
    pub const THREAT_RULE_PREFIX: &str = "threat:";
}

/// Built-in threat pattern thresholds
pub mod threat {
    pub const BRUTE_FORCE_THRESHOLD: usize = 5;
    pub const BRUTE_FORCE_WINDOW_SECS: i64 = 300;
    pub const BRUTE_FORCE_RISK: i64 = 30;

    pub const CREDENTIAL_STUFFING_DISTINCT_USERS: usize = 3;
    pub const CREDENTIAL_STUFFING_WINDOW_SECS: i64 = 600;
    pub const CREDENTIAL_STUFFING_RISK: i64 = 40;

    pub const PRIVILEGE_ESCALATION_THRESHOLD: usize = 3;
    pub const PRIVILEGE_ESCALATION_WINDOW_SECS: i64 = 600;
    pub const PRIVILEGE_ESCALATION_RISK: i64 = 25;

    pub const DATA_EXFILTRATION_THRESHOLD: usize = 50;
    pub const DATA_EXFILTRATION_WINDOW_SECS: i64 = 300;
    pub const DATA_EXFILTRATION_RISK: i64 = 35;

    pub const SECURITY_VIOLATION_RISK: i64 = 50;

    /// Accumulated IP risk at which every further event is flagged
    pub const HIGH_RISK_SOURCE_LIMIT: i64 = 100;
    pub const HIGH_RISK_SOURCE_RISK: i64 = 10;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_TOKEN_ISSUER: &str = "TOKEN_ISSUER";
    pub const ENV_TOKEN_AUDIENCE: &str = "TOKEN_AUDIENCE";
    pub const ENV_ACCESS_TOKEN_TTL_SECS: &str = "ACCESS_TOKEN_TTL_SECS";
    pub const ENV_REFRESH_TOKEN_TTL_SECS: &str = "REFRESH_TOKEN_TTL_SECS";
    pub const ENV_KEY_ROTATION_INTERVAL_SECS: &str = "KEY_ROTATION_INTERVAL_SECS";
    pub const ENV_SIGNING_KEY_PATH: &str = "SIGNING_KEY_PATH";
    pub const ENV_AUDIT_QUEUE_CAPACITY: &str = "AUDIT_QUEUE_CAPACITY";
    pub const ENV_AUDIT_STORE_MAX_EVENTS: &str = "AUDIT_STORE_MAX_EVENTS";
    pub const ENV_SECURITY_RULES_YAML_PATH: &str = "SECURITY_RULES_YAML_PATH";
    pub const ENV_PASSWORD_MEMORY_KIB: &str = "PASSWORD_MEMORY_KIB";
    pub const ENV_PASSWORD_ITERATIONS: &str = "PASSWORD_ITERATIONS";
    pub const ENV_PASSWORD_PARALLELISM: &str = "PASSWORD_PARALLELISM";
    pub const ENV_STORAGE_FAILURE_THRESHOLD: &str = "STORAGE_FAILURE_THRESHOLD";
    pub const ENV_STORAGE_COOLDOWN_SECS: &str = "STORAGE_COOLDOWN_SECS";
    pub const ENV_BLACKLIST_MAX_CAPACITY: &str = "BLACKLIST_MAX_CAPACITY";
    pub const ENV_MAINTENANCE_INTERVAL_SECS: &str = "MAINTENANCE_INTERVAL_SECS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Configuration defaults
pub mod defaults {
    pub const TOKEN_ISSUER: &str = "sentinel-trust";
    pub const TOKEN_AUDIENCE: &str = "sentinel-api";
    pub const ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;
    pub const REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;
    pub const KEY_ROTATION_INTERVAL_SECS: u64 = 24 * 3600;
    pub const AUDIT_QUEUE_CAPACITY: usize = 1000;
    /// Oldest events are evicted past this
    pub const AUDIT_STORE_MAX_EVENTS: usize = 100_000;
    /// OWASP minimum for Argon2id (19 MiB, 2 iterations, 1 lane)
    pub const PASSWORD_MEMORY_KIB: u32 = 19 * 1024;
    pub const PASSWORD_ITERATIONS: u32 = 2;
    pub const PASSWORD_PARALLELISM: u32 = 1;
    pub const STORAGE_FAILURE_THRESHOLD: u32 = 5;
    pub const STORAGE_COOLDOWN_SECS: u64 = 5;
    pub const BLACKLIST_MAX_CAPACITY: u64 = 100_000;
    pub const MAINTENANCE_INTERVAL_SECS: u64 = 60;
}
