//! Metric names and the instruments recorded for each playground turn

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};

pub const TURN_COUNT: &str = "playground.turn.count";
pub const TURN_DURATION: &str = "playground.turn.duration";
pub const TIME_TO_FIRST_TOKEN: &str = "playground.time_to_first_token";
pub const TOKEN_USAGE: &str = "playground.token.usage";
pub const CACHE_HITS: &str = "playground.cache.hits";

/// Instruments for completion turns
///
/// Without an installed meter provider every recording is a no-op.
#[derive(Clone)]
pub struct SessionMetrics {
    turns: Counter<u64>,
    turn_duration: Histogram<f64>,
    time_to_first_token: Histogram<f64>,
    tokens: Counter<u64>,
    cache_hits: Counter<u64>,
}

impl SessionMetrics {
    /// Create instruments from the global meter
    pub fn new() -> Self {
        let meter = global::meter("himmi");

        Self {
            turns: meter
                .u64_counter(TURN_COUNT)
                .with_description("Completed playground turns by outcome")
                .build(),
            turn_duration: meter
                .f64_histogram(TURN_DURATION)
                .with_unit("s")
                .with_description("Wall time from request to finalized message")
                .build(),
            time_to_first_token: meter
                .f64_histogram(TIME_TO_FIRST_TOKEN)
                .with_unit("s")
                .build(),
            tokens: meter
                .u64_counter(TOKEN_USAGE)
                .with_description("Tokens reported by the gateway")
                .build(),
            cache_hits: meter.u64_counter(CACHE_HITS).build(),
        }
    }

    /// Record a finished turn
    pub fn record_turn(&self, model: &str, outcome: &'static str, started: Instant) {
        let attributes = [
            KeyValue::new("model", model.to_owned()),
            KeyValue::new("outcome", outcome),
        ];
        self.turns.add(1, &attributes);
        self.turn_duration.record(started.elapsed().as_secs_f64(), &attributes);
    }

    /// Record the latency of the first streamed delta
    pub fn record_first_token(&self, model: &str, started: Instant) {
        self.time_to_first_token
            .record(started.elapsed().as_secs_f64(), &[KeyValue::new("model", model.to_owned())]);
    }

    /// Record token usage from a usage event
    pub fn record_usage(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) {
        let model = KeyValue::new("model", model.to_owned());
        self.tokens
            .add(prompt_tokens, &[model.clone(), KeyValue::new("kind", "prompt")]);
        self.tokens
            .add(completion_tokens, &[model, KeyValue::new("kind", "completion")]);
    }

    /// Record a response inferred to be served from cache
    pub fn record_cache_hit(&self, model: &str) {
        self.cache_hits.add(1, &[KeyValue::new("model", model.to_owned())]);
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMetrics").finish_non_exhaustive()
    }
}
