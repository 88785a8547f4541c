// Signing key lifecycle: active key, scheduled rotation, grace-period retention

use crate::constants::token;
use crate::core::crypto::{fill_random, generate_secure_token};
use crate::core::errors::{CryptoError, TrustError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use der::Decode;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use pkcs8::PrivateKeyInfo;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Ed25519 signing key pair owned by the [`KeyRegistry`]
pub struct SigningKeyPair {
    key_id: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    created_at: DateTime<Utc>,
}

impl SigningKeyPair {
    /// Generate a fresh key pair with a random key id
    pub fn generate(created_at: DateTime<Utc>) -> Result<Self, CryptoError> {
        let mut secret = Zeroizing::new([0u8; 32]);
        fill_random(secret.as_mut())?;
        let key_id = format!(
            "{}{}",
            token::KEY_ID_PREFIX,
            generate_secure_token(token::KEY_ID_LENGTH)?
        );
        Ok(Self::from_signing_key(key_id, SigningKey::from_bytes(&secret), created_at))
    }

    /// Wrap an existing signing key
    pub fn from_signing_key(
        key_id: impl Into<String>,
        signing_key: SigningKey,
        created_at: DateTime<Utc>,
    ) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            key_id: key_id.into(),
            signing_key,
            verifying_key,
            created_at,
        }
    }

    /// Load an Ed25519 private key from a PKCS#8 PEM file
    ///
    /// The key id is derived from the public key so restarts with the same
    /// file keep verifying previously issued tokens.
    pub fn from_pem_file<P: AsRef<Path>>(path: P, created_at: DateTime<Utc>) -> Result<Self, CryptoError> {
        let pem_bytes = Zeroizing::new(
            fs::read(path.as_ref())
                .map_err(|e| CryptoError::KeyLoadError(format!("Failed to read key file: {}", e)))?,
        );

        let pem_str = std::str::from_utf8(&pem_bytes)
            .map_err(|e| CryptoError::KeyLoadError(format!("Invalid PEM encoding: {}", e)))?;

        let pem = pem::parse(pem_str)
            .map_err(|e| CryptoError::KeyLoadError(format!("Failed to parse PEM: {}", e)))?;

        let pkcs8_key = PrivateKeyInfo::from_der(pem.contents())
            .map_err(|e| CryptoError::KeyLoadError(format!("Failed to parse PKCS8 DER: {}", e)))?;

        // RFC 8410 wraps the 32-byte seed in an inner OCTET STRING
        let key_bytes = match pkcs8_key.private_key {
            [0x04, 0x20, rest @ ..] if rest.len() == 32 => rest,
            raw if raw.len() == 32 => raw,
            other => {
                return Err(CryptoError::KeyLoadError(format!(
                    "Invalid Ed25519 key length: expected 32 bytes, got {}",
                    other.len()
                )))
            }
        };

        let mut key_array = Zeroizing::new([0u8; 32]);
        key_array.copy_from_slice(key_bytes);
        let signing_key = SigningKey::from_bytes(&key_array);

        let digest = Sha256::digest(signing_key.verifying_key().as_bytes());
        let key_id = format!("{}{}", token::KEY_ID_PREFIX, &hex::encode(digest)[..token::KEY_ID_LENGTH]);

        Ok(Self::from_signing_key(key_id, signing_key, created_at))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Public key as unpadded base64url (32 raw bytes)
    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.verifying_key.as_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Strict Ed25519 verification (rejects malleable and small-order encodings)
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.verifying_key.verify_strict(message, signature).is_ok()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("key_id", &self.key_id)
            .field("public_key", &self.public_key_b64())
            .field("created_at", &self.created_at)
            .field("private_key", &"<REDACTED>")
            .finish()
    }
}

/// Public half of a held key, for distribution to verifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub kid: String,
    pub alg: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

struct RegistryState {
    /// Oldest first; the back entry is the active key
    keys: VecDeque<Arc<SigningKeyPair>>,
    last_rotation: DateTime<Utc>,
}

impl RegistryState {
    fn active(&self) -> Result<Arc<SigningKeyPair>, TrustError> {
        self.keys
            .back()
            .cloned()
            .ok_or_else(|| TrustError::StateError("Key registry holds no keys".to_string()))
    }

    fn rotation_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        now - self.last_rotation >= interval
    }
}

/// Holds the active signing key plus the previous generation for verification
///
/// Readers (`active_key`, `lookup`) take a shared lock; rotation takes the
/// write lock once, so a half-rotated state is never observable.
pub struct KeyRegistry {
    state: RwLock<RegistryState>,
    rotation_interval: Duration,
}

impl KeyRegistry {
    /// Create a registry with a freshly generated active key
    pub fn new(rotation_interval: Duration) -> Result<Self, TrustError> {
        let now = Utc::now();
        let key = SigningKeyPair::generate(now)?;
        Ok(Self::with_initial_key(key, rotation_interval))
    }

    /// Create a registry whose first active key is provided by the caller
    pub fn with_initial_key(key: SigningKeyPair, rotation_interval: Duration) -> Self {
        let last_rotation = key.created_at();
        info!(kid = %key.key_id(), "Key registry initialized");

        let mut keys = VecDeque::with_capacity(token::RETAINED_KEY_GENERATIONS + 1);
        keys.push_back(Arc::new(key));

        Self {
            state: RwLock::new(RegistryState { keys, last_rotation }),
            rotation_interval,
        }
    }

    pub fn rotation_interval(&self) -> Duration {
        self.rotation_interval
    }

    /// Key used for new signatures
    pub fn active_key(&self) -> Result<Arc<SigningKeyPair>, TrustError> {
        self.read()?.active()
    }

    /// Resolve a key by the `kid` carried in a token header
    pub fn lookup(&self, key_id: &str) -> Result<Arc<SigningKeyPair>, TrustError> {
        self.read()?
            .keys
            .iter()
            .find(|k| k.key_id() == key_id)
            .cloned()
            .ok_or_else(|| TrustError::UnknownSigningKey {
                kid: key_id.to_string(),
            })
    }

    /// Rotate if the interval has elapsed since the last rotation
    ///
    /// Returns the id of the active key after the call. Before the interval
    /// elapses this is a no-op returning the current active id.
    pub fn rotate(&self, now: DateTime<Utc>) -> Result<String, TrustError> {
        self.rotate_with(now, SigningKeyPair::generate)
    }

    /// Rotate using a caller-supplied key source
    ///
    /// A failing source leaves the current key active and does not move the
    /// rotation clock, so the next scheduled check retries.
    pub fn rotate_with<F>(&self, now: DateTime<Utc>, generate: F) -> Result<String, TrustError>
    where
        F: FnOnce(DateTime<Utc>) -> Result<SigningKeyPair, CryptoError>,
    {
        {
            let state = self.read()?;
            if !state.rotation_due(now, self.rotation_interval) {
                return Ok(state.active()?.key_id().to_string());
            }
        }

        let new_key = match generate(now) {
            Ok(key) => Arc::new(key),
            Err(e) => {
                warn!(error = %e, "Signing key generation failed, keeping current key");
                return Err(TrustError::CryptoError(e));
            }
        };

        let mut state = self.write()?;

        // Another caller may have rotated while the key was generated
        if !state.rotation_due(now, self.rotation_interval) {
            return Ok(state.active()?.key_id().to_string());
        }

        let previous = state.active().ok().map(|k| k.key_id().to_string());
        state.keys.push_back(Arc::clone(&new_key));
        state.last_rotation = now;

        let mut evicted = Vec::new();
        while state.keys.len() > token::RETAINED_KEY_GENERATIONS {
            if let Some(old) = state.keys.pop_front() {
                evicted.push(old.key_id().to_string());
            }
        }
        drop(state);

        info!(
            kid = %new_key.key_id(),
            previous_kid = ?previous,
            evicted = ?evicted,
            "Signing key rotated"
        );

        Ok(new_key.key_id().to_string())
    }

    /// Public keys of every held key, active key last
    pub fn verification_keys(&self) -> Result<Vec<VerificationKey>, TrustError> {
        let state = self.read()?;
        let active_id = state.active()?.key_id().to_string();
        Ok(state
            .keys
            .iter()
            .map(|k| VerificationKey {
                kid: k.key_id().to_string(),
                alg: token::ALGORITHM.to_string(),
                public_key: k.public_key_b64(),
                created_at: k.created_at(),
                active: k.key_id() == active_id,
            })
            .collect())
    }

    pub fn last_rotation(&self) -> Result<DateTime<Utc>, TrustError> {
        Ok(self.read()?.last_rotation)
    }

    pub fn key_count(&self) -> Result<usize, TrustError> {
        Ok(self.read()?.keys.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, TrustError> {
        self.state
            .read()
            .map_err(|_| TrustError::StateError("Key registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, TrustError> {
        self.state
            .write()
            .map_err(|_| TrustError::StateError("Key registry lock poisoned".to_string()))
    }
}
