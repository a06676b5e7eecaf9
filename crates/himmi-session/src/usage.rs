//! Session-wide token and cost accounting

use himmi_client::{PricingInfo, UsageRecord};

/// Running totals for one session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    /// Turns that completed successfully
    pub request_count: u64,
    pub cumulative_completion_tokens: u64,
    /// Estimated spend in the pricing currency
    pub cumulative_cost: f64,
}

/// Cost of a usage record under the given per-million-token pricing
#[allow(clippy::cast_precision_loss)]
pub fn cost_of(record: &UsageRecord, pricing: &PricingInfo) -> f64 {
    let prompt = record.prompt_tokens as f64 * pricing.input_cost_per_million_tokens;
    let completion = record.completion_tokens as f64 * pricing.output_cost_per_million_tokens;
    let cost = (prompt + completion) / 1_000_000.0;

    if cost.is_finite() && cost > 0.0 { cost } else { 0.0 }
}

/// Accumulates usage events into [`SessionStats`]
///
/// Totals never decrease until [`UsageAccumulator::reset`].
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    stats: SessionStats,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one usage event and return the cost it contributed
    pub fn apply(&mut self, record: &UsageRecord, pricing: &PricingInfo) -> f64 {
        let cost = cost_of(record, pricing);

        self.stats.cumulative_completion_tokens = self
            .stats
            .cumulative_completion_tokens
            .saturating_add(record.completion_tokens);
        self.stats.cumulative_cost += cost;

        cost
    }

    /// Count a successfully completed turn
    pub fn record_request(&mut self) {
        self.stats.request_count = self.stats.request_count.saturating_add(1);
    }

    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.stats = SessionStats::default();
    }
}
