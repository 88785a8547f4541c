// Unit tests for token issuance and validation

use crate::common::*;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use sentinel_trust::auth::token_service::{IssueRequest, TokenService};
use sentinel_trust::core::errors::{ErrorKind, TrustError};
use sentinel_trust::core::models::TokenType;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Sign an arbitrary header and payload with the harness's active key
fn forge(harness: &TokenHarness, header: Value, payload: Value) -> String {
    let key = harness.keys.active_key().unwrap();
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    let message = format!("{}.{}", header_b64, payload_b64);
    let signature = key.sign(message.as_bytes());
    format!("{}.{}", message, URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

fn payload_of(token: &str) -> Value {
    let segment = token.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
}

#[tokio::test]
async fn test_issue_validate_roundtrip() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-42")).unwrap();

    let access = harness.service.validate(&pair.access_token).await.unwrap();
    let refresh = harness.service.validate(&pair.refresh_token).await.unwrap();

    assert_eq!(access.user_id, "user-42");
    assert_eq!(access.email, "user-42@example.com");
    assert_eq!(access.role, "member");
    assert_eq!(access.permissions, vec!["bookings:read", "bookings:write"]);
    assert_eq!(access.token_type, TokenType::Access);
    assert_eq!(refresh.token_type, TokenType::Refresh);
    assert_eq!(access.session_id, refresh.session_id);
    assert_ne!(access.token_id, refresh.token_id);
    assert_eq!(access.issuer, "sentinel-trust-test");
    assert_eq!(access.audience, "sentinel-api-test");
    assert_eq!(access.expires_at - access.issued_at, 15 * 60);
    assert_eq!(refresh.expires_at - refresh.issued_at, 7 * 24 * 3600);
    assert_eq!(pair.expires_at, access.expires_at_utc());
}

#[tokio::test]
async fn test_token_ids_unique() {
    let harness = token_harness();
    let mut ids = HashSet::new();

    for i in 0..100 {
        let pair = harness.service.issue_pair(issue_request(&format!("user-{}", i))).unwrap();
        for token in [&pair.access_token, &pair.refresh_token] {
            let jti = payload_of(token)["jti"].as_str().unwrap().to_string();
            assert!(ids.insert(jti), "duplicate token id issued");
        }
    }
    assert_eq!(ids.len(), 200);
}

#[tokio::test]
async fn test_caller_session_id_is_kept() {
    let harness = token_harness();
    let mut request = issue_request("user-1");
    request.session_id = "sess-abc".to_string();

    let pair = harness.service.issue_pair(request).unwrap();
    let claims = harness.service.validate(&pair.access_token).await.unwrap();
    assert_eq!(claims.session_id, "sess-abc");
}

#[test]
fn test_issue_requires_user_id() {
    let harness = token_harness();
    let result = harness.service.issue_pair(IssueRequest::default());
    assert!(matches!(result, Err(TrustError::MissingClaim(ref c)) if c == "sub"));
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let harness = token_harness();
    let pair = harness
        .service
        .issue_pair_at(issue_request("user-1"), Utc::now() - Duration::hours(1))
        .unwrap();

    let result = harness.service.validate(&pair.access_token).await;
    assert!(matches!(result, Err(TrustError::TokenExpired)));

    // Refresh token from the same pair is still inside its lifetime
    assert!(harness.service.validate(&pair.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_expiry_boundary_is_exclusive() {
    let harness = token_harness();
    let issued = Utc::now();
    let pair = harness.service.issue_pair_at(issue_request("user-1"), issued).unwrap();
    let claims = harness.service.validate_at(&pair.access_token, issued).await.unwrap();

    let at_exp = claims.expires_at_utc();
    assert!(matches!(
        harness.service.validate_at(&pair.access_token, at_exp).await,
        Err(TrustError::TokenExpired)
    ));
    assert!(harness
        .service
        .validate_at(&pair.access_token, at_exp - Duration::seconds(1))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_not_yet_valid_rejected() {
    let harness = token_harness();
    let pair = harness
        .service
        .issue_pair_at(issue_request("user-1"), Utc::now() + Duration::minutes(5))
        .unwrap();

    let result = harness.service.validate(&pair.access_token).await;
    assert!(matches!(result, Err(TrustError::TokenNotYetValid)));
}

#[tokio::test]
async fn test_swapped_payload_fails_signature() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();

    let access: Vec<&str> = pair.access_token.split('.').collect();
    let refresh: Vec<&str> = pair.refresh_token.split('.').collect();
    let spliced = format!("{}.{}.{}", access[0], refresh[1], access[2]);

    let err = harness.service.validate(&spliced).await.unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignature));
    assert_eq!(err.kind(), ErrorKind::Cryptographic);
}

#[tokio::test]
async fn test_unsupported_algorithm() {
    let harness = token_harness();
    let kid = harness.keys.active_key().unwrap().key_id().to_string();
    let token = forge(
        &harness,
        json!({"alg": "none", "typ": "JWT", "kid": kid}),
        json!({"sub": "user-1"}),
    );

    let result = harness.service.validate(&token).await;
    assert!(matches!(result, Err(TrustError::UnsupportedAlgorithm(ref alg)) if alg == "none"));
}

#[tokio::test]
async fn test_unknown_key_id() {
    let harness = token_harness();
    let token = forge(
        &harness,
        json!({"alg": "EdDSA", "typ": "JWT", "kid": "key_retired"}),
        json!({"sub": "user-1"}),
    );

    let result = harness.service.validate(&token).await;
    assert!(matches!(result, Err(TrustError::UnknownSigningKey { ref kid }) if kid == "key_retired"));
}

#[tokio::test]
async fn test_missing_claim_detected_after_signature() {
    let harness = token_harness();
    let kid = harness.keys.active_key().unwrap().key_id().to_string();
    let now = Utc::now().timestamp();
    let token = forge(
        &harness,
        json!({"alg": "EdDSA", "typ": "JWT", "kid": kid}),
        json!({
            "jti": "t-1", "sid": "s-1", "typ": "access",
            "email": "", "role": "", "device_id": "", "ip": "",
            "iss": "sentinel-trust-test", "aud": "sentinel-api-test",
            "iat": now, "nbf": now, "exp": now + 60
        }),
    );

    let err = harness.service.validate(&token).await.unwrap_err();
    assert!(matches!(err, TrustError::MissingClaim(ref c) if c == "sub"));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[tokio::test]
async fn test_garbage_tokens_are_malformed() {
    let harness = token_harness();
    for token in ["", "abc", "a.b.c", "!!!.???.***", "eyJhbGciOiJFZERTQSJ9..sig"] {
        let err = harness.service.validate(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed, "token {:?} gave {:?}", token, err);
    }
}

#[tokio::test]
async fn test_issuer_and_audience_checked() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();

    let mut other_issuer = test_token_config();
    other_issuer.issuer = "someone-else".to_string();
    let verifier = TokenService::new(harness.keys.clone(), harness.blacklist.clone(), other_issuer).unwrap();
    assert!(matches!(
        verifier.validate(&pair.access_token).await,
        Err(TrustError::InvalidIssuer(ref iss)) if iss == "sentinel-trust-test"
    ));

    let mut other_audience = test_token_config();
    other_audience.audience = "reporting-api".to_string();
    let verifier = TokenService::new(harness.keys.clone(), harness.blacklist.clone(), other_audience).unwrap();
    assert!(matches!(
        verifier.validate(&pair.access_token).await,
        Err(TrustError::InvalidAudience(_))
    ));
}

#[tokio::test]
async fn test_revoke_blocks_token_until_expiry() {
    let harness = token_harness();
    let issued = Utc::now();
    let pair = harness.service.issue_pair_at(issue_request("user-1"), issued).unwrap();

    harness.service.revoke(&pair.access_token).await.unwrap();

    let err = harness.service.validate(&pair.access_token).await.unwrap_err();
    assert!(matches!(err, TrustError::TokenRevoked));
    assert_eq!(err.kind(), ErrorKind::Policy);

    let later = issued + Duration::minutes(10);
    assert!(matches!(
        harness.service.validate_at(&pair.access_token, later).await,
        Err(TrustError::TokenRevoked)
    ));

    // The other half of the pair is untouched
    assert!(harness.service.validate(&pair.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_revoke_invalid_token_fails() {
    let harness = token_harness();
    assert!(harness.service.revoke("not.a.token").await.is_err());

    let expired = harness
        .service
        .issue_pair_at(issue_request("user-1"), Utc::now() - Duration::hours(1))
        .unwrap();
    assert!(matches!(
        harness.service.revoke(&expired.access_token).await,
        Err(TrustError::TokenExpired)
    ));
    assert!(harness.blacklist.is_empty());
}

#[tokio::test]
async fn test_successful_revocations_hold_when_blacklist_fills() {
    let harness = token_harness_with_capacity(test_token_config(), 4);

    let mut revoked = 0;
    let mut refused = 0;
    for i in 0..20 {
        let pair = harness
            .service
            .issue_pair(issue_request(&format!("user-{}", i)))
            .unwrap();
        match harness.service.revoke(&pair.access_token).await {
            Ok(()) => {
                revoked += 1;
                assert!(matches!(
                    harness.service.validate(&pair.access_token).await,
                    Err(TrustError::TokenRevoked)
                ));
            }
            Err(TrustError::StateError(_)) => {
                refused += 1;
                assert!(harness.service.validate(&pair.access_token).await.is_ok());
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(revoked, 4);
    assert_eq!(refused, 16);
}

#[tokio::test]
async fn test_refresh_issues_new_pair_in_same_session() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();
    let original = harness.service.validate(&pair.refresh_token).await.unwrap();

    let renewed = harness
        .service
        .refresh(&pair.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .unwrap();
    let claims = harness.service.validate(&renewed.access_token).await.unwrap();

    assert_eq!(claims.session_id, original.session_id);
    assert_eq!(claims.user_id, "user-1");
    assert_eq!(claims.permissions, original.permissions);
    assert_eq!(claims.device_id, "device-laptop-01");

    // The presented refresh token is not consumed
    assert!(harness.service.validate(&pair.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_refresh_from_other_device_after_success() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();

    harness
        .service
        .refresh(&pair.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .unwrap();

    let second = harness
        .service
        .refresh(&pair.refresh_token, "device-phone-02", "203.0.113.10")
        .await;
    assert!(matches!(
        second,
        Err(TrustError::BindingMismatch { ref field }) if field == "device_id"
    ));
}

#[tokio::test]
async fn test_revoked_refresh_token_cannot_refresh() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();

    harness.service.revoke(&pair.refresh_token).await.unwrap();

    assert!(matches!(
        harness
            .service
            .refresh(&pair.refresh_token, "device-laptop-01", "203.0.113.10")
            .await,
        Err(TrustError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_refresh_requires_refresh_token() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();

    let result = harness
        .service
        .refresh(&pair.access_token, "device-laptop-01", "203.0.113.10")
        .await;
    assert!(matches!(
        result,
        Err(TrustError::WrongTokenType { ref expected, ref actual }) if expected == "refresh" && actual == "access"
    ));
}

#[tokio::test]
async fn test_refresh_binding_mismatch() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("user-1")).unwrap();

    let other_device = harness
        .service
        .refresh(&pair.refresh_token, "device-phone-02", "203.0.113.10")
        .await;
    assert!(matches!(
        other_device,
        Err(TrustError::BindingMismatch { ref field }) if field == "device_id"
    ));

    let other_ip = harness
        .service
        .refresh(&pair.refresh_token, "device-laptop-01", "198.51.100.7")
        .await;
    assert!(matches!(
        other_ip,
        Err(TrustError::BindingMismatch { ref field }) if field == "ip_address"
    ));

    // Mismatches leave the refresh token valid
    assert!(harness.service.validate(&pair.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_session_wide_revocation_not_implemented() {
    let harness = token_harness();
    let err = harness.service.revoke_session("sess-1").await.unwrap_err();
    assert!(matches!(err, TrustError::NotImplemented(_)));
    assert_eq!(err.status_code(), 501);

    assert!(matches!(
        harness.service.revoke_all_user_tokens("user-1").await,
        Err(TrustError::NotImplemented(_))
    ));
}
