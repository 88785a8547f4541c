// End-to-end token flows: rotation grace period, revocation, refresh chains

use crate::common::*;
use chrono::{Duration, Utc};
use sentinel_trust::auth::blacklist::Blacklist;
use sentinel_trust::auth::key_registry::KeyRegistry;
use sentinel_trust::auth::token_service::TokenService;
use sentinel_trust::core::errors::TrustError;
use static_assertions::assert_impl_all;
use std::collections::HashSet;
use std::sync::Arc;

assert_impl_all!(TokenService: Send, Sync);
assert_impl_all!(KeyRegistry: Send, Sync);

#[tokio::test]
async fn test_tokens_survive_one_rotation() {
    let harness = token_harness();
    let before = harness.service.issue_pair(issue_request("alice")).unwrap();

    let started = harness.keys.last_rotation().unwrap();
    harness
        .keys
        .rotate(started + Duration::hours(ROTATION_HOURS))
        .unwrap();

    // Signed by the previous key, still verifiable
    assert!(harness.service.validate(&before.access_token).await.is_ok());

    let after = harness.service.issue_pair(issue_request("alice")).unwrap();
    assert!(harness.service.validate(&after.access_token).await.is_ok());

    harness
        .keys
        .rotate(started + Duration::hours(2 * ROTATION_HOURS))
        .unwrap();

    assert!(matches!(
        harness.service.validate(&before.access_token).await,
        Err(TrustError::UnknownSigningKey { .. })
    ));
    assert!(harness.service.validate(&after.access_token).await.is_ok());
}

#[tokio::test]
async fn test_revocation_holds_until_natural_expiry() {
    let harness = token_harness();
    let issued = Utc::now();
    let pair = harness.service.issue_pair_at(issue_request("bob"), issued).unwrap();
    let claims = harness.service.validate(&pair.access_token).await.unwrap();

    harness.service.revoke(&pair.access_token).await.unwrap();

    for minutes in [1, 5, 14] {
        assert!(matches!(
            harness
                .service
                .validate_at(&pair.access_token, issued + Duration::minutes(minutes))
                .await,
            Err(TrustError::TokenRevoked)
        ));
    }

    // Past expiry the token is rejected as expired, not revoked
    assert!(matches!(
        harness
            .service
            .validate_at(&pair.access_token, claims.expires_at_utc())
            .await,
        Err(TrustError::TokenExpired)
    ));

    harness.blacklist.cleanup().await.unwrap();
    assert!(harness
        .blacklist
        .is_blacklisted(&claims.token_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_refresh_chain() {
    let harness = token_harness();
    let first = harness.service.issue_pair(issue_request("carol")).unwrap();
    let session = harness
        .service
        .validate(&first.access_token)
        .await
        .unwrap()
        .session_id;

    let second = harness
        .service
        .refresh(&first.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .unwrap();
    let third = harness
        .service
        .refresh(&second.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .unwrap();

    let claims = harness.service.validate(&third.access_token).await.unwrap();
    assert_eq!(claims.session_id, session);

    // Earlier refresh tokens stay usable until revoked
    assert!(harness
        .service
        .refresh(&first.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .is_ok());

    harness.service.revoke(&second.refresh_token).await.unwrap();
    assert!(matches!(
        harness
            .service
            .refresh(&second.refresh_token, "device-laptop-01", "203.0.113.10")
            .await,
        Err(TrustError::TokenRevoked)
    ));
    assert!(harness
        .service
        .refresh(&third.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .is_ok());

    // Access tokens from earlier pairs stay valid until they expire
    assert!(harness.service.validate(&first.access_token).await.is_ok());
}

#[tokio::test]
async fn test_refresh_across_rotation() {
    let harness = token_harness();
    let pair = harness.service.issue_pair(issue_request("dave")).unwrap();

    let started = harness.keys.last_rotation().unwrap();
    let new_kid = harness
        .keys
        .rotate(started + Duration::hours(ROTATION_HOURS))
        .unwrap();

    let renewed = harness
        .service
        .refresh(&pair.refresh_token, "device-laptop-01", "203.0.113.10")
        .await
        .unwrap();

    let header = renewed.access_token.split('.').next().unwrap();
    let header: serde_json::Value = serde_json::from_slice(
        &base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, header).unwrap(),
    )
    .unwrap();
    assert_eq!(header["kid"], new_kid.as_str());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_unique_ids() {
    let harness = Arc::new(token_harness());

    let mut handles = Vec::new();
    for worker in 0..8 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..25 {
                let pair = harness
                    .service
                    .issue_pair(issue_request(&format!("user-{}", worker)))
                    .unwrap();
                let claims = harness.service.validate(&pair.access_token).await.unwrap();
                ids.push(claims.token_id);
            }
            ids
        }));
    }

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(all.insert(id));
        }
    }
    assert_eq!(all.len(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_validation_during_rotation() {
    let harness = Arc::new(token_harness());
    let pair = harness.service.issue_pair(issue_request("erin")).unwrap();
    let started = harness.keys.last_rotation().unwrap();

    let validator = {
        let harness = harness.clone();
        let token = pair.access_token.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                match harness.service.validate(&token).await {
                    Ok(_) | Err(TrustError::UnknownSigningKey { .. }) => {}
                    Err(e) => panic!("unexpected validation error: {:?}", e),
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 1..=5 {
        harness
            .keys
            .rotate(started + Duration::hours(i * ROTATION_HOURS))
            .unwrap();
        tokio::task::yield_now().await;
    }

    validator.await.unwrap();
    assert_eq!(harness.keys.key_count().unwrap(), 2);
}
