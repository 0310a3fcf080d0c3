use std::sync::Arc;

use time::{Date, OffsetDateTime};

use tollgate_common::PricingTable;
use tollgate_protocol::TokenUsage;

use crate::gate::QuotaGate;
use crate::quota::calculate_quota;
use crate::store::CounterStore;
use crate::types::{GateContext, UsageDeltas};

/// Everything the accumulate step needs about the request, captured at gate
/// time so recording does not depend on caches or re-lookups.
#[derive(Debug, Clone)]
pub struct MeterTicket {
    pub api_key_id: i64,
    pub key_secret: String,
    pub user_id: i64,
    pub membership_level: String,
    pub model: Option<String>,
    pub day: Date,
    pub cycle_label: String,
}

impl MeterTicket {
    pub fn from_context(ctx: &GateContext, model: Option<String>, now: OffsetDateTime) -> Self {
        Self {
            api_key_id: ctx.key.key.id,
            key_secret: ctx.key.key.key_value.clone(),
            user_id: ctx.user.user_id,
            membership_level: ctx.user.membership_level.clone(),
            model,
            day: now.date(),
            cycle_label: ctx.user.cycle_label.clone(),
        }
    }
}

/// Prices extracted usage and applies it to the daily key counter and the
/// monthly user counter, then invalidates the gate caches for both.
pub struct UsageMeter {
    counters: Arc<dyn CounterStore>,
    gate: Arc<QuotaGate>,
    pricing: PricingTable,
}

impl UsageMeter {
    pub fn new(counters: Arc<dyn CounterStore>, gate: Arc<QuotaGate>, pricing: PricingTable) -> Self {
        Self {
            counters,
            gate,
            pricing,
        }
    }

    /// Applies one request's usage. `None` means no telemetry was observed
    /// (timeouts, bodies without a usage object) and nothing is billed.
    ///
    /// Counter writes are independent: if one fails the other is still
    /// attempted, and cache invalidation runs regardless so the next gate
    /// check never reads totals staler than whatever was committed.
    pub async fn record(&self, ticket: &MeterTicket, usage: Option<TokenUsage>) {
        let Some(usage) = usage else {
            return;
        };
        let billed = calculate_quota(
            &usage,
            &ticket.membership_level,
            ticket.model.as_deref(),
            &self.pricing,
        );
        if billed.is_zero() {
            return;
        }
        let deltas = UsageDeltas {
            input_tokens: billed.billed_input_tokens,
            cached_tokens: billed.billed_cached_tokens,
            output_tokens: billed.billed_output_tokens,
            quota_micros: billed.quota_micros,
        };

        if let Err(err) = self
            .counters
            .upsert_increment_daily_key_usage(ticket.api_key_id, ticket.day, &deltas)
            .await
        {
            tracing::warn!(
                error = %err,
                api_key_id = ticket.api_key_id,
                "daily usage counter write failed"
            );
        }
        if let Err(err) = self
            .counters
            .upsert_increment_monthly_user_usage(ticket.user_id, &ticket.cycle_label, &deltas)
            .await
        {
            tracing::warn!(
                error = %err,
                user_id = ticket.user_id,
                "monthly usage counter write failed"
            );
        }

        self.gate.invalidate_key(&ticket.key_secret).await;
        self.gate.invalidate_user(ticket.user_id).await;

        tracing::debug!(
            api_key_id = ticket.api_key_id,
            user_id = ticket.user_id,
            input_tokens = deltas.input_tokens,
            cached_tokens = deltas.cached_tokens,
            output_tokens = deltas.output_tokens,
            quota_micros = deltas.quota_micros,
            "usage recorded"
        );
    }
}
