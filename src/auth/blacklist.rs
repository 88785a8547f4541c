// Token revocation list

use crate::core::errors::TrustError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::warn;

/// Revocation list keyed by token id
///
/// An entry only needs to outlive the token it revokes; after `expires_at`
/// the token fails expiry checks on its own.
#[async_trait]
pub trait Blacklist: Send + Sync {
    /// Revoke `token_id` until `expires_at`
    async fn add(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), TrustError>;

    /// Whether `token_id` has a non-expired revocation entry
    async fn is_blacklisted(&self, token_id: &str) -> Result<bool, TrustError>;

    /// Evict expired entries
    async fn cleanup(&self) -> Result<(), TrustError>;
}

/// Expires each entry at the revoked token's own expiry
struct RevocationExpiry;

impl Expiry<String, DateTime<Utc>> for RevocationExpiry {
    fn expire_after_create(
        &self,
        _token_id: &String,
        expires_at: &DateTime<Utc>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some((*expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Moka-based in-memory blacklist
///
/// Entries leave only when the token they revoke expires. Once
/// `max_entries` live entries are held, new revocations are refused with
/// `StateError` rather than evicting an existing one.
pub struct MemoryBlacklist {
    cache: Cache<String, DateTime<Utc>>,
    max_entries: u64,
}

impl MemoryBlacklist {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder().expire_after(RevocationExpiry).build();

        Self {
            cache,
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Number of live entries (approximate until `cleanup` runs)
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn has_room(&self) -> bool {
        // Count lags behind inserts and expiries until pending tasks run
        self.cache.run_pending_tasks().await;
        self.cache.entry_count() < self.max_entries
    }
}

#[async_trait]
impl Blacklist for MemoryBlacklist {
    async fn add(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), TrustError> {
        if expires_at <= Utc::now() {
            return Ok(());
        }
        if !self.cache.contains_key(token_id) && !self.has_room().await {
            warn!(
                jti = %token_id,
                max_entries = self.max_entries,
                "Token blacklist full, revocation refused"
            );
            return Err(TrustError::StateError(format!(
                "token blacklist full ({} entries)",
                self.max_entries
            )));
        }
        self.cache.insert(token_id.to_string(), expires_at).await;
        Ok(())
    }

    async fn is_blacklisted(&self, token_id: &str) -> Result<bool, TrustError> {
        // Eviction is lazy, so check the stored expiry as well
        Ok(self
            .cache
            .get(token_id)
            .await
            .map_or(false, |expires_at| expires_at > Utc::now()))
    }

    async fn cleanup(&self) -> Result<(), TrustError> {
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}
