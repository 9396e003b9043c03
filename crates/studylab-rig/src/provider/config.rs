//! Configuration for the completion provider.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Connection settings for an OpenAI-compatible chat completions API.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ProviderConfig {
    /// API key sent as a bearer token.
    #[cfg_attr(feature = "config", arg(long, env = "OPENAI_API_KEY", default_value = ""))]
    pub api_key: String,

    /// Base URL of the API, without the `/chat/completions` suffix.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAI_API_BASE", default_value = DEFAULT_API_BASE)
    )]
    pub api_base: String,

    /// Chat model identifier.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)
    )]
    pub model: String,

    /// Sampling temperature.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAI_TEMPERATURE", default_value_t = 0.7)
    )]
    pub temperature: f32,

    /// Upper bound on generated tokens, model default when unset.
    #[cfg_attr(feature = "config", arg(long, env = "OPENAI_MAX_TOKENS"))]
    pub max_tokens: Option<u32>,

    /// HTTP request timeout in seconds for one completion round.
    #[cfg_attr(
        feature = "config",
        arg(long = "openai-timeout", env = "OPENAI_TIMEOUT", default_value_t = 120)
    )]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Creates a configuration with defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::config("OPENAI_API_KEY is not set"));
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(Error::config(format!(
                "api base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config("temperature must be between 0.0 and 2.0"));
        }
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_trims_slash() {
        let config = ProviderConfig::new("sk-test").with_api_base("http://localhost:8080/v1/");
        assert_eq!(
            config.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn validation() {
        assert!(ProviderConfig::default().validate().is_err());
        assert!(ProviderConfig::new("sk-test").validate().is_ok());
        assert!(
            ProviderConfig::new("sk-test")
                .with_temperature(2.5)
                .validate()
                .is_err()
        );
        assert!(
            ProviderConfig::new("sk-test")
                .with_api_base("ftp://example.com")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn debug_redacts_key() {
        let debug = format!("{:?}", ProviderConfig::new("sk-secret"));
        assert!(!debug.contains("sk-secret"));
    }
}
