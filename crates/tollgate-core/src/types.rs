use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use time::{Date, OffsetDateTime};

/// Monetary amounts are stored as integer micro-USD so the counter store can
/// increment them atomically. `Decimal` is used for pricing math and display.
pub type MicroUsd = i64;

const MICROS_PER_USD: i64 = 1_000_000;

pub fn micros_from_decimal(amount: Decimal) -> MicroUsd {
    (amount * Decimal::from(MICROS_PER_USD))
        .round()
        .to_i64()
        .unwrap_or(i64::MAX)
}

pub fn decimal_from_micros(micros: MicroUsd) -> Decimal {
    Decimal::new(micros, 6).normalize()
}

/// One API key row as the gate sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub id: i64,
    pub user_id: i64,
    /// Globally unique, immutable after creation.
    pub key_value: String,
    pub label: Option<String>,
    /// Monthly quota ceiling; None = unlimited.
    pub monthly_quota_micros: Option<MicroUsd>,
    pub expires_at: Option<OffsetDateTime>,
    pub enabled: bool,
    pub last_used_at: Option<OffsetDateTime>,
}

/// Cached projection of an API key plus its current-cycle consumption.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySnapshot {
    pub key: KeyRecord,
    /// Sum of daily quota_used rows within the owner's active billing cycle.
    pub cycle_quota_used_micros: MicroUsd,
}

/// Cached projection combining identity, subscription state, plan ceiling and
/// consumption so far this cycle. Eventually consistent; refreshed by
/// invalidation after every successful accumulate.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDetail {
    pub user_id: i64,
    pub name: Option<String>,
    pub subscription_active: bool,
    pub membership_level: String,
    /// Plan ceiling; None = unlimited.
    pub monthly_quota_micros: Option<MicroUsd>,
    pub quota_used_micros: MicroUsd,
    /// Scopes the monthly counter row, derived from the subscription period
    /// start (not necessarily a calendar month).
    pub cycle_label: String,
    pub cycle_start: Date,
}

/// Increments applied to one daily and one monthly counter row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDeltas {
    pub input_tokens: i64,
    pub cached_tokens: i64,
    pub output_tokens: i64,
    pub quota_micros: MicroUsd,
}

/// Resolved by a successful gate check; carries everything the forwarding and
/// metering stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct GateContext {
    pub key: KeySnapshot,
    pub user: UserDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_round_trip() {
        let amount = Decimal::new(125, 2); // $1.25
        let micros = micros_from_decimal(amount);
        assert_eq!(micros, 1_250_000);
        assert_eq!(decimal_from_micros(micros), amount);
    }

    #[test]
    fn sub_micro_amounts_round_to_nearest() {
        // $0.0000004 rounds down to zero micros, $0.0000006 up to one.
        assert_eq!(micros_from_decimal(Decimal::new(4, 7)), 0);
        assert_eq!(micros_from_decimal(Decimal::new(6, 7)), 1);
    }
}
