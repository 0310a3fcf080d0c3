use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use tollgate_common::PricingTable;
use tollgate_protocol::TokenUsage;

use crate::types::{MicroUsd, micros_from_decimal};

const TOKENS_PER_UNIT: i64 = 1_000_000;
/// Cache reads are billed at a tenth of the input price.
const CACHED_TOKENS_PER_UNIT: i64 = 10_000_000;

/// Result of pricing one request's raw token counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BilledUsage {
    pub billed_input_tokens: i64,
    pub billed_cached_tokens: i64,
    pub billed_output_tokens: i64,
    pub quota_micros: MicroUsd,
}

impl BilledUsage {
    pub fn is_zero(&self) -> bool {
        *self == BilledUsage::default()
    }
}

/// Pure pricing function: token counts and a membership level in, billed
/// counts and a micro-USD quota amount out.
///
/// Cached tokens are subtracted from input (they are billed at the cache-read
/// rate instead of full input price); everything is then scaled by the
/// membership discount multiplier. All-zero input yields an all-zero result
/// so no counter row is written for telemetry-free requests.
pub fn calculate_quota(
    usage: &TokenUsage,
    membership_level: &str,
    model: Option<&str>,
    pricing: &PricingTable,
) -> BilledUsage {
    // Telemetry is untrusted input and the stored counters are add-only, so
    // negative counts clamp to zero before pricing.
    let input_tokens = usage.input_tokens.max(0);
    let cached_tokens = usage.cached_tokens.max(0);
    let output_tokens = usage.output_tokens.max(0);
    if input_tokens == 0 && cached_tokens == 0 && output_tokens == 0 {
        return BilledUsage::default();
    }

    let (input_price, output_price) = pricing.price_for(model);
    let multiplier = pricing.discount_for(membership_level);

    let net_input = (input_tokens - cached_tokens).max(0);
    let quota = input_price * Decimal::from(net_input) / Decimal::from(TOKENS_PER_UNIT)
        + input_price * Decimal::from(cached_tokens) / Decimal::from(CACHED_TOKENS_PER_UNIT)
        + output_price * Decimal::from(output_tokens) / Decimal::from(TOKENS_PER_UNIT);

    BilledUsage {
        billed_input_tokens: scale_tokens(net_input, multiplier),
        billed_cached_tokens: scale_tokens(cached_tokens, multiplier),
        billed_output_tokens: scale_tokens(output_tokens, multiplier),
        quota_micros: micros_from_decimal(quota * multiplier),
    }
}

fn scale_tokens(tokens: i64, multiplier: Decimal) -> i64 {
    (Decimal::from(tokens) * multiplier)
        .round()
        .to_i64()
        .unwrap_or(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PricingTable {
        PricingTable::default()
    }

    fn usage(input: i64, output: i64, cached: i64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            cached_tokens: cached,
        }
    }

    #[test]
    fn zero_usage_yields_zero_billing() {
        let billed = calculate_quota(&usage(0, 0, 0), "lite", None, &table());
        assert!(billed.is_zero());
    }

    #[test]
    fn one_million_input_tokens_costs_the_input_price() {
        // Default input price is $1.25 per million tokens.
        let billed = calculate_quota(&usage(1_000_000, 0, 0), "lite", None, &table());
        assert_eq!(billed.billed_input_tokens, 1_000_000);
        assert_eq!(billed.quota_micros, 1_250_000);
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let a = calculate_quota(&usage(1000, 500, 100), "lite", None, &table());
        let b = calculate_quota(&usage(1000, 500, 100), "lite", None, &table());
        assert_eq!(a, b);
    }

    #[test]
    fn cached_tokens_shift_billed_input_exactly() {
        let without = calculate_quota(&usage(1000, 0, 0), "lite", None, &table());
        let with = calculate_quota(&usage(1000, 0, 300), "lite", None, &table());
        assert_eq!(
            without.billed_input_tokens - with.billed_input_tokens,
            300
        );
        assert_eq!(with.billed_cached_tokens, 300);
    }

    #[test]
    fn cached_tokens_are_billed_at_a_tenth() {
        // 1M fully cached input: $1.25 / 10 = $0.125.
        let billed = calculate_quota(&usage(1_000_000, 0, 1_000_000), "lite", None, &table());
        assert_eq!(billed.billed_input_tokens, 0);
        assert_eq!(billed.quota_micros, 125_000);
    }

    #[test]
    fn discount_scales_tokens_and_quota() {
        let lite = calculate_quota(&usage(1_000_000, 0, 0), "lite", None, &table());
        let pro = calculate_quota(&usage(1_000_000, 0, 0), "pro", None, &table());
        assert_eq!(pro.billed_input_tokens, 900_000);
        assert_eq!(pro.quota_micros, lite.quota_micros * 9 / 10);
    }

    #[test]
    fn negative_telemetry_counts_clamp_to_zero() {
        // usage(input, output, cached)
        let billed = calculate_quota(&usage(100, -50, -5), "lite", None, &table());
        assert_eq!(billed.billed_output_tokens, 0);
        assert_eq!(billed.billed_cached_tokens, 0);
        assert_eq!(
            billed,
            calculate_quota(&usage(100, 0, 0), "lite", None, &table())
        );

        let all_negative = calculate_quota(&usage(-10, -10, -10), "lite", None, &table());
        assert!(all_negative.is_zero());
    }

    #[test]
    fn cached_exceeding_input_saturates_net_input() {
        let billed = calculate_quota(&usage(100, 0, 500), "lite", None, &table());
        assert_eq!(billed.billed_input_tokens, 0);
        assert_eq!(billed.billed_cached_tokens, 500);
    }
}
