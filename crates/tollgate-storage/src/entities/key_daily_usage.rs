use sea_orm::entity::prelude::*;
use time::{Date, OffsetDateTime};

/// Per-key, per-day usage counters. Incremented in place by an upsert so
/// concurrent requests never lose updates.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "key_daily_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "key_daily_usage_key_day")]
    pub api_key_id: i64,
    #[sea_orm(unique_key = "key_daily_usage_key_day")]
    pub day: Date,
    pub input_tokens: i64,
    pub cached_tokens: i64,
    pub output_tokens: i64,
    pub quota_used_micros: i64,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "api_key_id", to = "id", on_delete = "Cascade")]
    pub api_key: HasOne<super::api_keys::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
