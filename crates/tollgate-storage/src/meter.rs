#![allow(clippy::needless_update)]

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectOptions, DatabaseConnection, DbErr, EntityTrait, ExprTrait,
    FromQueryResult, QueryFilter, QuerySelect, Schema,
};
use time::{Date, OffsetDateTime};

use tollgate_core::store::{CounterStore, KeyUserStore, StoreError, StoreResult, UsageCounters};
use tollgate_core::types::{KeyRecord, KeySnapshot, UsageDeltas, UserDetail};

use crate::cycle::{calendar_month_start, current_cycle_start, cycle_label};
use crate::db::connect_with_backoff;
use crate::entities;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] DbErr),
    #[error("counter row missing after upsert")]
    CounterRowMissing,
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Default plan tiers seeded at bootstrap. Ceilings are micro-USD.
pub const DEFAULT_PLANS: &[(&str, &str, Option<i64>)] = &[
    ("lite", "Lite", Some(20_000_000)),
    ("pro", "Pro", Some(100_000_000)),
    ("team", "Team", None),
];

#[derive(Clone)]
pub struct MeterStorage {
    db: DatabaseConnection,
}

#[derive(Debug, Default, FromQueryResult)]
struct QuotaSum {
    total: Option<i64>,
}

impl MeterStorage {
    pub async fn connect(database_url: &str) -> Result<Self, DbErr> {
        let db = connect_with_backoff(ConnectOptions::new(database_url)).await?;
        Ok(Self { db })
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Entity-first schema sync, run once at bootstrap.
    pub async fn sync(&self) -> Result<(), DbErr> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Users)
            .register(entities::Plans)
            .register(entities::Subscriptions)
            .register(entities::ApiKeys)
            .register(entities::KeyDailyUsage)
            .register(entities::UserMonthlyUsage)
            .sync(&self.db)
            .await
    }

    pub async fn health(&self) -> Result<(), DbErr> {
        entities::Plans::find().one(&self.db).await?;
        Ok(())
    }

    pub async fn ensure_plans(&self) -> StorageResult<()> {
        let now = OffsetDateTime::now_utc();
        for (code, name, quota) in DEFAULT_PLANS {
            let active = entities::plans::ActiveModel {
                code: ActiveValue::Set((*code).to_string()),
                name: ActiveValue::Set((*name).to_string()),
                monthly_quota_micros: ActiveValue::Set(*quota),
                created_at: ActiveValue::Set(now),
                ..Default::default()
            };
            entities::Plans::insert(active)
                .on_conflict(
                    OnConflict::column(entities::plans::Column::Code)
                        .do_nothing()
                        .to_owned(),
                )
                .do_nothing()
                .exec(&self.db)
                .await?;
        }
        Ok(())
    }

    pub async fn create_user(&self, name: Option<&str>) -> StorageResult<i64> {
        let now = OffsetDateTime::now_utc();
        let active = entities::users::ActiveModel {
            name: ActiveValue::Set(name.map(str::to_string)),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let result = entities::Users::insert(active).exec(&self.db).await?;
        Ok(result.last_insert_id)
    }

    pub async fn create_subscription(
        &self,
        user_id: i64,
        plan_code: &str,
        period_start: Date,
    ) -> StorageResult<i64> {
        let plan = entities::Plans::find()
            .filter(entities::plans::Column::Code.eq(plan_code))
            .one(&self.db)
            .await?
            .ok_or(StorageError::Db(DbErr::RecordNotFound(format!(
                "plan {plan_code}"
            ))))?;
        let now = OffsetDateTime::now_utc();
        let active = entities::subscriptions::ActiveModel {
            user_id: ActiveValue::Set(user_id),
            plan_id: ActiveValue::Set(plan.id),
            active: ActiveValue::Set(true),
            period_start: ActiveValue::Set(period_start),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let result = entities::Subscriptions::insert(active).exec(&self.db).await?;
        Ok(result.last_insert_id)
    }

    pub async fn set_subscription_active(&self, id: i64, active: bool) -> StorageResult<()> {
        entities::Subscriptions::update_many()
            .col_expr(entities::subscriptions::Column::Active, Expr::value(active))
            .col_expr(
                entities::subscriptions::Column::UpdatedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(entities::subscriptions::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Issues a new key. The secret is returned exactly once; it is stored
    /// verbatim and looked up by value.
    pub async fn create_api_key(
        &self,
        user_id: i64,
        label: Option<&str>,
        monthly_quota_micros: Option<i64>,
        expires_at: Option<OffsetDateTime>,
    ) -> StorageResult<(i64, String)> {
        let secret = format!("sk-tg-{}", uuid::Uuid::new_v4().simple());
        let now = OffsetDateTime::now_utc();
        let active = entities::api_keys::ActiveModel {
            user_id: ActiveValue::Set(user_id),
            key_value: ActiveValue::Set(secret.clone()),
            label: ActiveValue::Set(label.map(str::to_string)),
            monthly_quota_micros: ActiveValue::Set(monthly_quota_micros),
            enabled: ActiveValue::Set(true),
            expires_at: ActiveValue::Set(expires_at),
            created_at: ActiveValue::Set(now),
            last_used_at: ActiveValue::Set(None),
            ..Default::default()
        };
        let result = entities::ApiKeys::insert(active).exec(&self.db).await?;
        Ok((result.last_insert_id, secret))
    }

    pub async fn set_api_key_enabled(&self, api_key_id: i64, enabled: bool) -> StorageResult<()> {
        entities::ApiKeys::update_many()
            .col_expr(entities::api_keys::Column::Enabled, Expr::value(enabled))
            .filter(entities::api_keys::Column::Id.eq(api_key_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn delete_api_key(&self, api_key_id: i64) -> StorageResult<()> {
        entities::ApiKeys::delete_by_id(api_key_id)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn list_api_keys(
        &self,
        user_id: i64,
    ) -> StorageResult<Vec<entities::api_keys::Model>> {
        Ok(entities::ApiKeys::find()
            .filter(entities::api_keys::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?)
    }

    /// Retention cleanup for the daily table. Monthly rows are small and kept
    /// indefinitely.
    pub async fn purge_daily_usage_before(&self, day: Date) -> StorageResult<u64> {
        let result = entities::KeyDailyUsage::delete_many()
            .filter(entities::key_daily_usage::Column::Day.lt(day))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Cycle start for a user: the active subscription anchor advanced to the
    /// current window, or the calendar month when there is no subscription.
    async fn cycle_start_for_user(&self, user_id: i64, today: Date) -> StorageResult<Date> {
        let subscription = entities::Subscriptions::find()
            .filter(entities::subscriptions::Column::UserId.eq(user_id))
            .filter(entities::subscriptions::Column::Active.eq(true))
            .one(&self.db)
            .await?;
        Ok(match subscription {
            Some(sub) => current_cycle_start(sub.period_start, today),
            None => calendar_month_start(today),
        })
    }

    async fn sum_key_usage_since(&self, api_key_id: i64, since: Date) -> StorageResult<i64> {
        use entities::key_daily_usage::Column;
        let row = entities::KeyDailyUsage::find()
            .select_only()
            .column_as(Expr::col(Column::QuotaUsedMicros).sum(), "total")
            .filter(Column::ApiKeyId.eq(api_key_id))
            .filter(Column::Day.gte(since))
            .into_model::<QuotaSum>()
            .one(&self.db)
            .await?;
        Ok(row.unwrap_or_default().total.unwrap_or(0))
    }
}

#[async_trait]
impl KeyUserStore for MeterStorage {
    async fn lookup_api_key(&self, secret: &str) -> StoreResult<Option<KeySnapshot>> {
        let Some(row) = entities::ApiKeys::find()
            .filter(entities::api_keys::Column::KeyValue.eq(secret))
            .one(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?
        else {
            return Ok(None);
        };

        let today = OffsetDateTime::now_utc().date();
        let cycle_start = self
            .cycle_start_for_user(row.user_id, today)
            .await
            .map_err(StoreError::from)?;
        let used = self
            .sum_key_usage_since(row.id, cycle_start)
            .await
            .map_err(StoreError::from)?;

        Ok(Some(KeySnapshot {
            key: KeyRecord {
                id: row.id,
                user_id: row.user_id,
                key_value: row.key_value,
                label: row.label,
                monthly_quota_micros: row.monthly_quota_micros,
                expires_at: row.expires_at,
                enabled: row.enabled,
                last_used_at: row.last_used_at,
            },
            cycle_quota_used_micros: used,
        }))
    }

    async fn lookup_user_detail(&self, user_id: i64) -> StoreResult<Option<UserDetail>> {
        let Some(user) = entities::Users::find_by_id(user_id)
            .one(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?
        else {
            return Ok(None);
        };

        let subscription = entities::Subscriptions::find()
            .filter(entities::subscriptions::Column::UserId.eq(user_id))
            .filter(entities::subscriptions::Column::Active.eq(true))
            .one(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?;

        let today = OffsetDateTime::now_utc().date();
        let (active, membership_level, quota_limit, cycle_start) = match &subscription {
            Some(sub) => {
                let plan = entities::Plans::find_by_id(sub.plan_id)
                    .one(&self.db)
                    .await
                    .map_err(StorageError::from)
                    .map_err(StoreError::from)?;
                let (code, limit) = match plan {
                    Some(plan) => (plan.code, plan.monthly_quota_micros),
                    None => ("lite".to_string(), None),
                };
                (
                    true,
                    code,
                    limit,
                    current_cycle_start(sub.period_start, today),
                )
            }
            None => (
                false,
                "lite".to_string(),
                None,
                calendar_month_start(today),
            ),
        };

        let label = cycle_label(cycle_start);
        let usage = entities::UserMonthlyUsage::find()
            .filter(entities::user_monthly_usage::Column::UserId.eq(user_id))
            .filter(entities::user_monthly_usage::Column::CycleLabel.eq(&label))
            .one(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?;

        Ok(Some(UserDetail {
            user_id: user.id,
            name: user.name,
            subscription_active: active,
            membership_level,
            monthly_quota_micros: quota_limit,
            quota_used_micros: usage.map(|row| row.quota_used_micros).unwrap_or(0),
            cycle_label: label,
            cycle_start,
        }))
    }

    async fn touch_key_last_used(&self, api_key_id: i64, at: OffsetDateTime) -> StoreResult<()> {
        entities::ApiKeys::update_many()
            .col_expr(entities::api_keys::Column::LastUsedAt, Expr::value(at))
            .filter(entities::api_keys::Column::Id.eq(api_key_id))
            .exec(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MeterStorage {
    async fn upsert_increment_daily_key_usage(
        &self,
        api_key_id: i64,
        day: Date,
        deltas: &UsageDeltas,
    ) -> StoreResult<UsageCounters> {
        use entities::key_daily_usage::Column;

        let now = OffsetDateTime::now_utc();
        let active = entities::key_daily_usage::ActiveModel {
            api_key_id: ActiveValue::Set(api_key_id),
            day: ActiveValue::Set(day),
            input_tokens: ActiveValue::Set(deltas.input_tokens),
            cached_tokens: ActiveValue::Set(deltas.cached_tokens),
            output_tokens: ActiveValue::Set(deltas.output_tokens),
            quota_used_micros: ActiveValue::Set(deltas.quota_micros),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        // The increment happens inside the conflict clause so concurrent
        // writers serialize in the database instead of racing in memory.
        entities::KeyDailyUsage::insert(active)
            .on_conflict(
                OnConflict::columns([Column::ApiKeyId, Column::Day])
                    .value(
                        Column::InputTokens,
                        Expr::col(Column::InputTokens).add(deltas.input_tokens),
                    )
                    .value(
                        Column::CachedTokens,
                        Expr::col(Column::CachedTokens).add(deltas.cached_tokens),
                    )
                    .value(
                        Column::OutputTokens,
                        Expr::col(Column::OutputTokens).add(deltas.output_tokens),
                    )
                    .value(
                        Column::QuotaUsedMicros,
                        Expr::col(Column::QuotaUsedMicros).add(deltas.quota_micros),
                    )
                    .value(Column::UpdatedAt, Expr::value(now))
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?;

        let row = entities::KeyDailyUsage::find()
            .filter(Column::ApiKeyId.eq(api_key_id))
            .filter(Column::Day.eq(day))
            .one(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?
            .ok_or(StoreError::from(StorageError::CounterRowMissing))?;

        Ok(UsageCounters {
            input_tokens: row.input_tokens,
            cached_tokens: row.cached_tokens,
            output_tokens: row.output_tokens,
            quota_used_micros: row.quota_used_micros,
        })
    }

    async fn upsert_increment_monthly_user_usage(
        &self,
        user_id: i64,
        cycle_label: &str,
        deltas: &UsageDeltas,
    ) -> StoreResult<UsageCounters> {
        use entities::user_monthly_usage::Column;

        let now = OffsetDateTime::now_utc();
        let active = entities::user_monthly_usage::ActiveModel {
            user_id: ActiveValue::Set(user_id),
            cycle_label: ActiveValue::Set(cycle_label.to_string()),
            input_tokens: ActiveValue::Set(deltas.input_tokens),
            cached_tokens: ActiveValue::Set(deltas.cached_tokens),
            output_tokens: ActiveValue::Set(deltas.output_tokens),
            quota_used_micros: ActiveValue::Set(deltas.quota_micros),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        entities::UserMonthlyUsage::insert(active)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::CycleLabel])
                    .value(
                        Column::InputTokens,
                        Expr::col(Column::InputTokens).add(deltas.input_tokens),
                    )
                    .value(
                        Column::CachedTokens,
                        Expr::col(Column::CachedTokens).add(deltas.cached_tokens),
                    )
                    .value(
                        Column::OutputTokens,
                        Expr::col(Column::OutputTokens).add(deltas.output_tokens),
                    )
                    .value(
                        Column::QuotaUsedMicros,
                        Expr::col(Column::QuotaUsedMicros).add(deltas.quota_micros),
                    )
                    .value(Column::UpdatedAt, Expr::value(now))
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?;

        let row = entities::UserMonthlyUsage::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::CycleLabel.eq(cycle_label))
            .one(&self.db)
            .await
            .map_err(StorageError::from)
            .map_err(StoreError::from)?
            .ok_or(StoreError::from(StorageError::CounterRowMissing))?;

        Ok(UsageCounters {
            input_tokens: row.input_tokens,
            cached_tokens: row.cached_tokens,
            output_tokens: row.output_tokens,
            quota_used_micros: row.quota_used_micros,
        })
    }
}
