//! Per-turn token accounting.
//!
//! A [`UsageTracker`] is created for one turn, fed with the usage metadata
//! of every AI message and finally rendered as a [`ContextUsage`].

mod limits;

use serde_json::{Map, Value};
use studylab_core::types::{ContextUsage, TokenUsage};

pub use limits::{DEFAULT_CONTEXT_WINDOW, MODEL_LIMITS, context_window};

/// Tracing target for usage accounting.
const TRACING_TARGET: &str = "studylab_rig::usage";

/// Running token totals of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageTracker {
    model_id: String,
    max_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
    reasoning_tokens: u64,
    cached_tokens: u64,
}

impl UsageTracker {
    /// Creates a tracker sized for the given model.
    pub fn new(model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let max_tokens = context_window(&model_id);
        Self {
            model_id,
            max_tokens,
            input_tokens: 0,
            output_tokens: 0,
            reasoning_tokens: 0,
            cached_tokens: 0,
        }
    }

    pub fn add_input_tokens(&mut self, tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(tokens);
    }

    pub fn add_output_tokens(&mut self, tokens: u64) {
        self.output_tokens = self.output_tokens.saturating_add(tokens);
    }

    pub fn add_reasoning_tokens(&mut self, tokens: u64) {
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(tokens);
    }

    pub fn add_cached_tokens(&mut self, tokens: u64) {
        self.cached_tokens = self.cached_tokens.saturating_add(tokens);
    }

    /// Ingests message metadata holding a `usage_metadata` object.
    pub fn update_from_metadata(&mut self, metadata: &Map<String, Value>) {
        if let Some(usage) = metadata.get("usage_metadata") {
            self.update_from_usage(usage);
        }
    }

    /// Ingests a usage object with `input_tokens`, `output_tokens`,
    /// `reasoning_tokens` and `cached_tokens` counters.
    ///
    /// Missing or non-integer counters leave the totals unchanged.
    pub fn update_from_usage(&mut self, usage: &Value) {
        let Some(usage) = usage.as_object() else {
            tracing::debug!(target: TRACING_TARGET, "ignoring malformed usage metadata");
            return;
        };
        let counter = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or_default();

        self.add_input_tokens(counter("input_tokens"));
        self.add_output_tokens(counter("output_tokens"));
        self.add_reasoning_tokens(counter("reasoning_tokens"));
        self.add_cached_tokens(counter("cached_tokens"));
    }

    /// Input, output and reasoning tokens; cached tokens are excluded.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.reasoning_tokens)
    }

    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Fraction of the context window in use.
    pub fn percentage(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.total_tokens() as f64 / self.max_tokens as f64
    }

    /// Renders the totals as the `context` chunk payload.
    pub fn usage_info(&self) -> ContextUsage {
        ContextUsage {
            used_tokens: self.total_tokens(),
            max_tokens: self.max_tokens,
            usage: TokenUsage {
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
                reasoning_tokens: self.reasoning_tokens,
                cached_input_tokens: (self.cached_tokens > 0).then_some(self.cached_tokens),
            },
            model_id: self.model_id.clone(),
            percentage: self.percentage(),
        }
    }

    /// Logs the totals at info level.
    pub fn log_summary(&self) {
        tracing::info!(
            target: TRACING_TARGET,
            model = %self.model_id,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            reasoning_tokens = self.reasoning_tokens,
            cached_tokens = self.cached_tokens,
            total_tokens = self.total_tokens(),
            max_tokens = self.max_tokens,
            percentage = format!("{:.2}%", self.percentage() * 100.0),
            "token usage"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accumulates_metadata() {
        let mut tracker = UsageTracker::new("gpt-4o");
        let metadata = json!({
            "usage_metadata": {"input_tokens": 100, "output_tokens": 40, "cached_tokens": 30}
        });
        let metadata = metadata.as_object().cloned().unwrap_or_default();

        tracker.update_from_metadata(&metadata);
        tracker.update_from_metadata(&metadata);

        let info = tracker.usage_info();
        assert_eq!(info.used_tokens, 280);
        assert_eq!(info.max_tokens, 128_000);
        assert_eq!(info.usage.cached_input_tokens, Some(60));
        assert_eq!(info.model_id, "gpt-4o");
        assert!((info.percentage - 280.0 / 128_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ignores_malformed_metadata() {
        let mut tracker = UsageTracker::new("gpt-4");
        tracker.add_input_tokens(10);

        tracker.update_from_usage(&json!("not an object"));
        tracker.update_from_usage(&json!({"input_tokens": "many", "output_tokens": -3}));
        tracker.update_from_metadata(&Map::new());

        assert_eq!(tracker.total_tokens(), 10);
        assert_eq!(tracker.usage_info().usage.cached_input_tokens, None);
    }

    #[test]
    fn huge_counters_saturate() {
        let mut tracker = UsageTracker::new("gpt-4o");
        let usage = json!({"input_tokens": u64::MAX, "output_tokens": u64::MAX});

        tracker.update_from_usage(&usage);
        tracker.update_from_usage(&usage);
        tracker.add_reasoning_tokens(1);

        assert_eq!(tracker.total_tokens(), u64::MAX);
        assert_eq!(tracker.usage_info().usage.input_tokens, u64::MAX);
    }

    #[test]
    fn reasoning_counts_towards_total() {
        let mut tracker = UsageTracker::new("unknown-model");
        tracker.update_from_usage(&json!({"input_tokens": 1, "output_tokens": 2, "reasoning_tokens": 3}));
        assert_eq!(tracker.total_tokens(), 6);
        assert_eq!(tracker.max_tokens(), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn zero_window_has_zero_percentage() {
        let mut tracker = UsageTracker::new("gpt-4o");
        tracker.max_tokens = 0;
        tracker.add_output_tokens(5);
        assert_eq!(tracker.percentage(), 0.0);
    }
}
