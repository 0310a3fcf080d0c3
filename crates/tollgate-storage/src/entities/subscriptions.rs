use sea_orm::entity::prelude::*;
use time::{Date, OffsetDateTime};

/// A user's membership in a plan. `period_start` anchors the billing cycle;
/// the current cycle window is derived by advancing it month by month.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub active: bool,
    pub period_start: Date,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::users::Entity>,
    #[sea_orm(belongs_to, from = "plan_id", to = "id", on_delete = "Cascade")]
    pub plan: HasOne<super::plans::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
