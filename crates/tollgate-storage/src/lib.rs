//! Persistence for the metering pipeline: entity definitions, billing cycle
//! derivation, and the counter upserts the accumulator relies on.

pub mod cycle;
pub mod db;
pub mod entities;
pub mod meter;

pub use cycle::{calendar_month_start, current_cycle_start, cycle_label};
pub use db::{connect_with_backoff, connect_with_policy};
pub use meter::{DEFAULT_PLANS, MeterStorage, StorageError, StorageResult};
