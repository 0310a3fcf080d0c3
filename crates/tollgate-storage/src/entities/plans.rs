use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Membership plan tiers. `code` is the pricing discount key.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "plans_code")]
    pub code: String,
    pub name: String,
    /// Monthly consumption ceiling in micro-USD; NULL is unlimited.
    pub monthly_quota_micros: Option<i64>,
    pub created_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub subscriptions: HasMany<super::subscriptions::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
