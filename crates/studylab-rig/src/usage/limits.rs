//! Context window sizes of known models.

/// Context window assumed for models missing from [`MODEL_LIMITS`].
pub const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;

/// Known model ids and their context window in tokens.
pub const MODEL_LIMITS: &[(&str, u64)] = &[
    // OpenAI
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("o1", 200_000),
    ("o3-mini", 200_000),
    // Anthropic
    ("claude-opus-4-20250514", 200_000),
    ("claude-sonnet-4-20250514", 200_000),
    ("claude-3-7-sonnet-20250219", 200_000),
    ("claude-3-5-sonnet-20241022", 200_000),
    ("claude-3-5-haiku-20241022", 200_000),
    // Google
    ("gemini-2.0-flash-exp", 1_000_000),
    ("gemini-1.5-pro", 2_000_000),
    ("gemini-1.5-flash", 1_000_000),
    ("gemini-pro", 32_768),
    // DeepSeek
    ("deepseek-chat", 64_000),
    ("deepseek-reasoner", 64_000),
];

/// Returns the context window of a model.
pub fn context_window(model_id: &str) -> u64 {
    MODEL_LIMITS
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models() {
        assert_eq!(context_window("gpt-4"), 8_192);
        assert_eq!(context_window("gpt-3.5-turbo"), 16_385);
        assert_eq!(context_window("claude-sonnet-4-20250514"), 200_000);
        assert_eq!(context_window("gemini-2.0-flash-exp"), 1_000_000);
    }

    #[test]
    fn unknown_models_use_default() {
        assert_eq!(context_window("my-local-llama"), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(context_window(""), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn ids_are_unique() {
        for (i, (id, _)) in MODEL_LIMITS.iter().enumerate() {
            assert!(MODEL_LIMITS[i + 1..].iter().all(|(other, _)| other != id));
        }
    }
}
