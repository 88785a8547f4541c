// Domain error types - typed failures with no information disclosure

use thiserror::Error;

/// Error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unparseable input or missing required field. No side effects happened.
    Malformed,
    /// Signature mismatch, unknown algorithm or unknown key. Untrusted input.
    Cryptographic,
    /// Expected, user-recoverable condition (expired, revoked, binding mismatch).
    Policy,
    /// Storage, alert delivery, random source or configuration failure.
    Infrastructure,
}

/// Main error type for the trust core
#[derive(Error, Debug)]
pub enum TrustError {
    /// Token cannot be decoded (HTTP 400)
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Required claim is missing or empty (HTTP 400)
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// Signature verification failed (HTTP 401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Algorithm in the token header is not accepted (HTTP 401)
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key id is not held by the key registry (HTTP 401)
    #[error("Unknown signing key: {kid}")]
    UnknownSigningKey { kid: String },

    /// Token has expired (HTTP 401)
    #[error("Token expired")]
    TokenExpired,

    /// Token nbf claim is in the future (HTTP 401)
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Token id is on the blacklist (HTTP 401)
    #[error("Token revoked")]
    TokenRevoked,

    /// Issuer does not match configuration (HTTP 401)
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// Audience does not match configuration (HTTP 401)
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// Access token presented where a refresh token is required, or vice versa (HTTP 401)
    #[error("Wrong token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: String, actual: String },

    /// Refresh attempted from a different device or network location (HTTP 401)
    #[error("Token binding mismatch on {field}")]
    BindingMismatch { field: String },

    /// Cryptographic error (HTTP 500)
    #[error("Cryptographic error: {0}")]
    CryptoError(#[from] CryptoError),

    /// Audit storage failure (HTTP 503)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Alert delivery failure (HTTP 503)
    #[error("Alert delivery error: {0}")]
    AlertDeliveryError(String),

    /// Transient error (HTTP 503)
    /// Used when a circuit breaker rejects a call
    #[error("Transient error: {0}")]
    TransientError(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// State management error (HTTP 500)
    #[error("State error: {0}")]
    StateError(String),

    /// Operation referenced by the API but not backed by an implementation (HTTP 501)
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Cryptographic operation errors
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Failed to load private key
    #[error("Failed to load private key: {0}")]
    KeyLoadError(String),

    /// Failed to sign token
    #[error("Failed to sign token: {0}")]
    SigningError(String),

    /// Failed to hash a password or digest
    #[error("Failed to hash: {0}")]
    HashingError(String),

    /// Authenticated encryption or decryption failed
    #[error("Cipher error: {0}")]
    CipherError(String),

    /// Failed to read from the operating system random source
    #[error("Failed to generate random bytes")]
    RandomError,
}

impl TrustError {
    /// Classify this error into the taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustError::MalformedToken(_) | TrustError::MissingClaim(_) => ErrorKind::Malformed,
            TrustError::InvalidSignature
            | TrustError::UnsupportedAlgorithm(_)
            | TrustError::UnknownSigningKey { .. } => ErrorKind::Cryptographic,
            TrustError::TokenExpired
            | TrustError::TokenNotYetValid
            | TrustError::TokenRevoked
            | TrustError::InvalidIssuer(_)
            | TrustError::InvalidAudience(_)
            | TrustError::WrongTokenType { .. }
            | TrustError::BindingMismatch { .. } => ErrorKind::Policy,
            TrustError::CryptoError(_)
            | TrustError::StorageError(_)
            | TrustError::AlertDeliveryError(_)
            | TrustError::TransientError(_)
            | TrustError::ConfigurationError(_)
            | TrustError::StateError(_)
            | TrustError::NotImplemented(_) => ErrorKind::Infrastructure,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TrustError::MalformedToken(_) | TrustError::MissingClaim(_) => 400,
            TrustError::NotImplemented(_) => 501,
            TrustError::StorageError(_)
            | TrustError::AlertDeliveryError(_)
            | TrustError::TransientError(_) => 503,
            TrustError::CryptoError(_)
            | TrustError::ConfigurationError(_)
            | TrustError::StateError(_) => 500,
            _ => 401,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            TrustError::MalformedToken(_) | TrustError::MissingClaim(_) => {
                "Malformed token".to_string()
            }
            TrustError::InvalidSignature
            | TrustError::UnsupportedAlgorithm(_)
            | TrustError::UnknownSigningKey { .. } => "Invalid token".to_string(),
            TrustError::TokenExpired => "Token expired".to_string(),
            TrustError::TokenNotYetValid => "Token not yet valid".to_string(),
            TrustError::TokenRevoked => "Token revoked".to_string(),
            TrustError::InvalidIssuer(_) | TrustError::InvalidAudience(_) => {
                "Token not issued for this service".to_string()
            }
            TrustError::WrongTokenType { expected, .. } => {
                format!("A {} token is required", expected)
            }
            TrustError::BindingMismatch { .. } => {
                "Token cannot be used from this device or location".to_string()
            }
            TrustError::StorageError(_)
            | TrustError::AlertDeliveryError(_) => "Service unavailable".to_string(),
            TrustError::TransientError(_) => "Service briefly unavailable".to_string(),
            TrustError::NotImplemented(_) => "Operation not supported".to_string(),
            TrustError::CryptoError(_)
            | TrustError::ConfigurationError(_)
            | TrustError::StateError(_) => "Internal error".to_string(),
        }
    }
}
