use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Per-user, per-cycle usage counters. `cycle_label` is the ISO date of the
/// cycle start, so a row is scoped to one billing window.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_monthly_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "user_monthly_usage_user_cycle")]
    pub user_id: i64,
    #[sea_orm(unique_key = "user_monthly_usage_user_cycle")]
    pub cycle_label: String,
    pub input_tokens: i64,
    pub cached_tokens: i64,
    pub output_tokens: i64,
    pub quota_used_micros: i64,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::users::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
