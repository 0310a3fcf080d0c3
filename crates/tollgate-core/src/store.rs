use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::types::{KeySnapshot, UsageDeltas, UserDetail};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Counter values after an upsert-increment has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounters {
    pub input_tokens: i64,
    pub cached_tokens: i64,
    pub output_tokens: i64,
    pub quota_used_micros: i64,
}

/// Key and user lookups consumed by the gate. Backed by a persistent
/// relational store; the gate puts a short-TTL cache in front.
#[async_trait]
pub trait KeyUserStore: Send + Sync {
    async fn lookup_api_key(&self, secret: &str) -> StoreResult<Option<KeySnapshot>>;
    async fn lookup_user_detail(&self, user_id: i64) -> StoreResult<Option<UserDetail>>;
    /// Best-effort bookkeeping; failures must not affect the request.
    async fn touch_key_last_used(&self, api_key_id: i64, at: OffsetDateTime) -> StoreResult<()>;
}

/// Usage counters. Increments MUST happen in the store (upsert with
/// in-place add), never read-modify-write in application code, so that
/// concurrent requests against the same row cannot lose updates.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn upsert_increment_daily_key_usage(
        &self,
        api_key_id: i64,
        day: Date,
        deltas: &UsageDeltas,
    ) -> StoreResult<UsageCounters>;

    async fn upsert_increment_monthly_user_usage(
        &self,
        user_id: i64,
        cycle_label: &str,
        deltas: &UsageDeltas,
    ) -> StoreResult<UsageCounters>;
}
