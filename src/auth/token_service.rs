// Token issuance, validation, refresh and revocation

use crate::auth::blacklist::Blacklist;
use crate::auth::key_registry::KeyRegistry;
use crate::constants::token;
use crate::core::crypto::generate_secure_token;
use crate::core::errors::{CryptoError, TrustError};
use crate::core::models::{TokenClaims, TokenPair, TokenType};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Issuer, audience and lifetimes applied to every token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    fn validate(&self) -> Result<(), TrustError> {
        if self.issuer.is_empty() || self.audience.is_empty() {
            return Err(TrustError::ConfigurationError(
                "Token issuer and audience must be set".to_string(),
            ));
        }
        if self.access_ttl <= Duration::zero() {
            return Err(TrustError::ConfigurationError(
                "Access token TTL must be positive".to_string(),
            ));
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(TrustError::ConfigurationError(
                "Access token TTL must be shorter than refresh token TTL".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity and binding data for a new token pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    /// Empty means "start a new session"
    pub session_id: String,
    pub device_id: String,
    pub ip_address: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
    kid: String,
}

/// Claims that must be present and non-empty before deserializing
const REQUIRED_CLAIMS: [&str; 5] = ["jti", "sub", "sid", "typ", "exp"];

/// Issues and checks Ed25519-signed compact JWS tokens
pub struct TokenService {
    keys: Arc<KeyRegistry>,
    blacklist: Arc<dyn Blacklist>,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(
        keys: Arc<KeyRegistry>,
        blacklist: Arc<dyn Blacklist>,
        config: TokenConfig,
    ) -> Result<Self, TrustError> {
        config.validate()?;
        Ok(Self {
            keys,
            blacklist,
            config,
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue an access/refresh pair sharing one session id
    pub fn issue_pair(&self, request: IssueRequest) -> Result<TokenPair, TrustError> {
        self.issue_pair_at(request, Utc::now())
    }

    /// Issue a pair as of `now`
    pub fn issue_pair_at(&self, request: IssueRequest, now: DateTime<Utc>) -> Result<TokenPair, TrustError> {
        if request.user_id.is_empty() {
            return Err(TrustError::MissingClaim("sub".to_string()));
        }

        let session_id = if request.session_id.is_empty() {
            generate_secure_token(token::TOKEN_ID_LENGTH)?
        } else {
            request.session_id.clone()
        };

        let access_claims = self.claims_for(&request, &session_id, TokenType::Access, now)?;
        let refresh_claims = self.claims_for(&request, &session_id, TokenType::Refresh, now)?;

        let access_token = self.sign_claims(&access_claims)?;
        let refresh_token = self.sign_claims(&refresh_claims)?;

        debug!(
            user_id = %request.user_id,
            session_id = %session_id,
            access_jti = %access_claims.token_id,
            "Token pair issued"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at: access_claims.expires_at_utc(),
        })
    }

    /// Validate a token against the current time
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, TrustError> {
        self.validate_at(token, Utc::now()).await
    }

    /// Validate a token as of `now`
    ///
    /// Checks run in order: structure, algorithm, key id, signature,
    /// temporal claims, revocation, issuer and audience. The first failure
    /// is returned and no claims are exposed.
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TrustError> {
        let claims = self.verify_signed(token)?;

        let now_secs = now.timestamp();
        if now_secs >= claims.expires_at {
            return Err(TrustError::TokenExpired);
        }
        if claims.not_before > now_secs {
            return Err(TrustError::TokenNotYetValid);
        }

        if self.blacklist.is_blacklisted(&claims.token_id).await? {
            return Err(TrustError::TokenRevoked);
        }

        if claims.issuer != self.config.issuer {
            return Err(TrustError::InvalidIssuer(claims.issuer));
        }
        if claims.audience != self.config.audience {
            return Err(TrustError::InvalidAudience(claims.audience));
        }

        Ok(claims)
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The presented device and IP must match the token's binding exactly.
    /// The refresh token stays valid until it expires or is revoked.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device_id: &str,
        ip_address: &str,
    ) -> Result<TokenPair, TrustError> {
        let claims = self.validate(refresh_token).await?;

        if claims.token_type != TokenType::Refresh {
            return Err(TrustError::WrongTokenType {
                expected: TokenType::Refresh.to_string(),
                actual: claims.token_type.to_string(),
            });
        }
        if claims.device_id != device_id {
            return Err(TrustError::BindingMismatch {
                field: "device_id".to_string(),
            });
        }
        if claims.ip_address != ip_address {
            return Err(TrustError::BindingMismatch {
                field: "ip_address".to_string(),
            });
        }

        let request = IssueRequest {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
            permissions: claims.permissions,
            session_id: claims.session_id,
            device_id: claims.device_id,
            ip_address: claims.ip_address,
        };

        info!(user_id = %request.user_id, session_id = %request.session_id, "Token pair refreshed");
        self.issue_pair(request)
    }

    /// Revoke a valid token until its natural expiry
    ///
    /// Fails without revoking when the blacklist refuses the entry.
    pub async fn revoke(&self, token: &str) -> Result<(), TrustError> {
        let claims = self.validate(token).await?;
        self.blacklist
            .add(&claims.token_id, claims.expires_at_utc())
            .await?;

        info!(
            jti = %claims.token_id,
            user_id = %claims.user_id,
            token_type = %claims.token_type,
            "Token revoked"
        );
        Ok(())
    }

    /// Revoke every token of a session
    ///
    /// Requires a session to token index, which this service does not keep.
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), TrustError> {
        Err(TrustError::NotImplemented(format!(
            "session-wide revocation (session {})",
            session_id
        )))
    }

    /// Revoke every token of a user
    ///
    /// Same limitation as [`TokenService::revoke_session`].
    pub async fn revoke_all_user_tokens(&self, user_id: &str) -> Result<(), TrustError> {
        Err(TrustError::NotImplemented(format!(
            "user-wide revocation (user {})",
            user_id
        )))
    }

    fn claims_for(
        &self,
        request: &IssueRequest,
        session_id: &str,
        token_type: TokenType,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TrustError> {
        let ttl = match token_type {
            TokenType::Access => self.config.access_ttl,
            TokenType::Refresh => self.config.refresh_ttl,
        };
        let issued_at = now.timestamp();

        Ok(TokenClaims {
            token_id: generate_secure_token(token::TOKEN_ID_LENGTH)?,
            user_id: request.user_id.clone(),
            email: request.email.clone(),
            role: request.role.clone(),
            permissions: request.permissions.clone(),
            session_id: session_id.to_string(),
            token_type,
            device_id: request.device_id.clone(),
            ip_address: request.ip_address.clone(),
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
            issued_at,
            not_before: issued_at,
            expires_at: issued_at.saturating_add(ttl.num_seconds()),
        })
    }

    /// Encode and sign claims with the active key
    fn sign_claims(&self, claims: &TokenClaims) -> Result<String, TrustError> {
        let key = self.keys.active_key()?;

        let header = TokenHeader {
            alg: token::ALGORITHM.to_string(),
            typ: token::TYPE.to_string(),
            kid: key.key_id().to_string(),
        };

        let header_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&header)
                .map_err(|e| CryptoError::SigningError(format!("Failed to serialize header: {}", e)))?,
        );
        let payload_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(claims)
                .map_err(|e| CryptoError::SigningError(format!("Failed to serialize claims: {}", e)))?,
        );

        let message = format!("{}.{}", header_b64, payload_b64);
        let signature = key.sign(message.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(format!("{}.{}", message, signature_b64))
    }

    /// Parse the token and verify its signature, returning the claims
    fn verify_signed(&self, token: &str) -> Result<TokenClaims, TrustError> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => {
                    return Err(TrustError::MalformedToken(
                        "expected three dot-separated segments".to_string(),
                    ))
                }
            };

        let header: TokenHeader = serde_json::from_slice(&decode_segment(header_b64, "header")?)
            .map_err(|e| TrustError::MalformedToken(format!("invalid header: {}", e)))?;

        if header.alg != token::ALGORITHM {
            return Err(TrustError::UnsupportedAlgorithm(header.alg));
        }

        let key = self.keys.lookup(&header.kid)?;

        let signature_bytes: [u8; 64] = decode_segment(signature_b64, "signature")?
            .try_into()
            .map_err(|_| TrustError::MalformedToken("invalid signature length".to_string()))?;
        let signature = Signature::from_bytes(&signature_bytes);

        let signed_len = header_b64.len() + 1 + payload_b64.len();
        if !key.verify(&token.as_bytes()[..signed_len], &signature) {
            return Err(TrustError::InvalidSignature);
        }

        let payload: Value = serde_json::from_slice(&decode_segment(payload_b64, "payload")?)
            .map_err(|e| TrustError::MalformedToken(format!("invalid payload: {}", e)))?;

        for claim in REQUIRED_CLAIMS {
            match payload.get(claim) {
                None | Some(Value::Null) => return Err(TrustError::MissingClaim(claim.to_string())),
                Some(Value::String(s)) if s.is_empty() => {
                    return Err(TrustError::MissingClaim(claim.to_string()))
                }
                _ => {}
            }
        }

        serde_json::from_value(payload)
            .map_err(|e| TrustError::MalformedToken(format!("invalid claims: {}", e)))
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, TrustError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TrustError::MalformedToken(format!("invalid {} encoding: {}", name, e)))
}
