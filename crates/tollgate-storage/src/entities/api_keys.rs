use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    #[sea_orm(unique_key = "api_keys_key_value")]
    pub key_value: String,
    pub label: Option<String>,
    /// Per-key monthly ceiling in micro-USD; NULL is unlimited.
    pub monthly_quota_micros: Option<i64>,
    pub enabled: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::users::Entity>,
    #[sea_orm(has_many)]
    pub daily_usage: HasMany<super::key_daily_usage::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
