// Cryptographic primitives: AEAD encryption, Argon2id password hashing,
// constant-time comparison, secure random tokens and event fingerprints

use crate::constants::crypto;
use crate::core::errors::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// URL-safe alphabet; 64 symbols so `byte % 64` stays uniform
const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Fill `buf` from the operating system random source
///
/// There is no fallback: a failing random source fails the caller.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng.try_fill_bytes(buf).map_err(|_| CryptoError::RandomError)
}

/// Generate a random URL-safe identifier of `length` characters
pub fn generate_secure_token(length: usize) -> Result<String, CryptoError> {
    let mut bytes = Zeroizing::new(vec![0u8; length]);
    fill_random(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|b| TOKEN_ALPHABET[(*b as usize) % TOKEN_ALPHABET.len()] as char)
        .collect())
}

/// Constant-time equality of two byte strings
///
/// Length mismatch returns false; lengths are not considered secret.
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// SHA-256 digest (hex) of an event's identifying tuple
pub fn event_fingerprint(event_type: &str, resource: &str, action: &str, ip_address: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in [event_type, resource, action, ip_address].iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Symmetric key for ChaCha20-Poly1305
///
/// Key material is zeroized on drop and never printed.
pub struct EncryptionKey(Secret<[u8; crypto::SYMMETRIC_KEY_LENGTH]>);

impl EncryptionKey {
    /// Generate a fresh random key
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; crypto::SYMMETRIC_KEY_LENGTH];
        fill_random(&mut bytes)?;
        Ok(Self(Secret::new(bytes)))
    }

    /// Wrap existing key material (must be 32 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; crypto::SYMMETRIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::KeyLoadError(format!(
                "Invalid symmetric key length: expected {} bytes, got {}",
                crypto::SYMMETRIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(Secret::new(key)))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, CryptoError> {
        ChaCha20Poly1305::new_from_slice(self.0.expose_secret())
            .map_err(|e| CryptoError::CipherError(format!("Failed to create cipher: {}", e)))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key", &"<REDACTED>")
            .finish()
    }
}

/// Encrypt with a fresh random nonce; output is `nonce || ciphertext`
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = key.cipher()?;

    let mut nonce_bytes = [0u8; crypto::NONCE_LENGTH];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::CipherError(format!("Encryption failed: {}", e)))?;

    let mut output = Vec::with_capacity(crypto::NONCE_LENGTH + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data produced by [`encrypt`]
pub fn decrypt(key: &EncryptionKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < crypto::NONCE_LENGTH {
        return Err(CryptoError::CipherError(
            "Invalid encrypted data: too short".to_string(),
        ));
    }

    let cipher = key.cipher()?;
    let (nonce_bytes, ciphertext) = data.split_at(crypto::NONCE_LENGTH);

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::CipherError(format!("Decryption failed: {}", e)))
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashParams {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            memory_kib: defaults::PASSWORD_MEMORY_KIB,
            iterations: defaults::PASSWORD_ITERATIONS,
            parallelism: defaults::PASSWORD_PARALLELISM,
        }
    }
}

impl PasswordHashParams {
    fn hasher(&self) -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(crypto::PASSWORD_HASH_LENGTH),
        )
        .map_err(|e| CryptoError::HashingError(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Stored password hash with everything needed to verify it later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    /// base64url hash output
    pub hash: String,
    /// base64url salt
    pub salt: String,
    pub algorithm: String,
    pub params: PasswordHashParams,
}

/// Hash a password with a fresh random salt
pub fn hash_password(
    password: &str,
    params: &PasswordHashParams,
) -> Result<PasswordHash, CryptoError> {
    let mut salt = [0u8; crypto::SALT_LENGTH];
    fill_random(&mut salt)?;

    let output = derive_password_hash(password, &salt, params)?;

    Ok(PasswordHash {
        hash: URL_SAFE_NO_PAD.encode(output.as_slice()),
        salt: URL_SAFE_NO_PAD.encode(salt),
        algorithm: crypto::PASSWORD_ALGORITHM.to_string(),
        params: *params,
    })
}

/// Verify a password against a stored hash in constant time
pub fn verify_password(password: &str, stored: &PasswordHash) -> Result<bool, CryptoError> {
    if stored.algorithm != crypto::PASSWORD_ALGORITHM {
        return Err(CryptoError::HashingError(format!(
            "Unsupported password algorithm: {}",
            stored.algorithm
        )));
    }

    let salt = URL_SAFE_NO_PAD
        .decode(&stored.salt)
        .map_err(|e| CryptoError::HashingError(format!("Invalid salt encoding: {}", e)))?;
    let expected = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(&stored.hash)
            .map_err(|e| CryptoError::HashingError(format!("Invalid hash encoding: {}", e)))?,
    );

    let computed = derive_password_hash(password, &salt, &stored.params)?;
    Ok(secure_compare(computed.as_slice(), expected.as_slice()))
}

fn derive_password_hash(
    password: &str,
    salt: &[u8],
    params: &PasswordHashParams,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut output = Zeroizing::new(vec![0u8; crypto::PASSWORD_HASH_LENGTH]);
    params
        .hasher()?
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| CryptoError::HashingError(format!("Argon2 hashing failed: {}", e)))?;
    Ok(output)
}
