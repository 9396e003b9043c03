//! Token accounting payloads.

use serde::{Deserialize, Serialize};

/// Token counts accumulated over one turn.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    /// Prompt tokens served from the provider cache.
    ///
    /// Already included in `input_tokens`, so never added to the total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
}

impl TokenUsage {
    /// Input, output and reasoning tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.reasoning_tokens
    }
}

/// Context window consumption, sent once per turn right before `end`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ContextUsage {
    pub used_tokens: u64,
    pub max_tokens: u64,
    pub usage: TokenUsage,
    pub model_id: String,
    /// Fraction of the window in use, `0.0` when the window is unknown.
    pub percentage: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn context_usage_is_camel_case() -> anyhow::Result<()> {
        let usage = ContextUsage {
            used_tokens: 150,
            max_tokens: 128_000,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                reasoning_tokens: 0,
                cached_input_tokens: Some(20),
            },
            model_id: "gpt-4o".into(),
            percentage: 150.0 / 128_000.0,
        };

        let value = serde_json::to_value(&usage)?;
        assert_eq!(value["usedTokens"], json!(150));
        assert_eq!(value["maxTokens"], json!(128_000));
        assert_eq!(value["modelId"], json!("gpt-4o"));
        assert_eq!(value["usage"]["inputTokens"], json!(100));
        assert_eq!(value["usage"]["cachedInputTokens"], json!(20));
        Ok(())
    }

    #[test]
    fn total_excludes_cached_tokens() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            reasoning_tokens: 3,
            cached_input_tokens: Some(7),
        };
        assert_eq!(usage.total(), 18);
    }
}
