pub mod api_keys;
pub mod key_daily_usage;
pub mod plans;
pub mod subscriptions;
pub mod user_monthly_usage;
pub mod users;

pub use api_keys::Entity as ApiKeys;
pub use key_daily_usage::Entity as KeyDailyUsage;
pub use plans::Entity as Plans;
pub use subscriptions::Entity as Subscriptions;
pub use user_monthly_usage::Entity as UserMonthlyUsage;
pub use users::Entity as Users;
