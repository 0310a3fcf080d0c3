use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::cache::TtlCache;
use crate::error::GateError;
use crate::store::KeyUserStore;
use crate::types::{GateContext, KeySnapshot, UserDetail};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// API key validation and two-level quota enforcement, with short-TTL caches
/// in front of the persistent store.
pub struct QuotaGate {
    store: Arc<dyn KeyUserStore>,
    // Misses are cached too: an unknown secret stays rejected without a
    // store round trip until the entry expires or is invalidated.
    keys: TtlCache<String, Option<KeySnapshot>>,
    users: TtlCache<i64, Option<UserDetail>>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn KeyUserStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            keys: TtlCache::new(cache_ttl),
            users: TtlCache::new(cache_ttl),
        }
    }

    /// Resolves a bearer credential and checks quota ceilings.
    ///
    /// Key-level quota is checked before user-level quota. Both comparisons
    /// are strict: usage exactly equal to the limit still passes, and the
    /// rejection lands on the request after the one that crossed the line.
    pub async fn check(
        &self,
        secret: &str,
        now: OffsetDateTime,
    ) -> Result<GateContext, GateError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(GateError::KeyInvalid);
        }

        let snapshot = self
            .keys
            .get_or_load(secret.to_string(), || async {
                self.store.lookup_api_key(secret).await
            })
            .await
            .map_err(|err| GateError::Store(err.to_string()))?
            .ok_or(GateError::KeyNotFound)?;

        if !snapshot.key.enabled {
            return Err(GateError::KeyInvalid);
        }
        if let Some(expires_at) = snapshot.key.expires_at
            && expires_at <= now
        {
            return Err(GateError::KeyInvalid);
        }
        if let Some(limit) = snapshot.key.monthly_quota_micros
            && snapshot.cycle_quota_used_micros > limit
        {
            return Err(GateError::KeyQuotaExceeded);
        }

        let user = self
            .users
            .get_or_load(snapshot.key.user_id, || async {
                self.store.lookup_user_detail(snapshot.key.user_id).await
            })
            .await
            .map_err(|err| GateError::Store(err.to_string()))?
            .ok_or(GateError::UserSubscriptionInactive)?;

        if !user.subscription_active {
            return Err(GateError::UserSubscriptionInactive);
        }
        if let Some(limit) = user.monthly_quota_micros
            && user.quota_used_micros > limit
        {
            return Err(GateError::UserQuotaExceeded);
        }

        if let Err(err) = self.store.touch_key_last_used(snapshot.key.id, now).await {
            tracing::debug!(error = %err, api_key_id = snapshot.key.id, "last_used touch failed");
        }

        Ok(GateContext { key: snapshot, user })
    }

    /// Drops the cached snapshot for a key secret. Called synchronously by
    /// the accumulate step so the next check observes fresh totals.
    pub async fn invalidate_key(&self, secret: &str) {
        self.keys.invalidate(&secret.to_string()).await;
    }

    pub async fn invalidate_user(&self, user_id: i64) {
        self.users.invalidate(&user_id).await;
    }
}
