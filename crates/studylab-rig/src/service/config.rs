//! Configuration for the chat service.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::provider::ProviderConfig;
use crate::tool::{SearchConfig, WeatherConfig};
use crate::{Error, Result};

/// Everything needed to build a [`ChatService`](super::ChatService).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ChatConfig {
    /// Completion provider connection.
    #[cfg_attr(feature = "config", command(flatten))]
    pub provider: ProviderConfig,

    /// Per-turn agent limits.
    #[cfg_attr(feature = "config", command(flatten))]
    pub agent: AgentConfig,

    /// Web search settings.
    #[cfg_attr(feature = "config", command(flatten))]
    pub search: SearchConfig,

    /// Weather settings.
    #[cfg_attr(feature = "config", command(flatten))]
    pub weather: WeatherConfig,
}

impl ChatConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_weather(mut self, weather: WeatherConfig) -> Self {
        self.weather = weather;
        self
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        self.agent.validate()?;
        if !(1..=20).contains(&self.search.max_results) {
            return Err(Error::config(format!(
                "search max results must be between 1 and 20, got {}",
                self.search.max_results
            )));
        }
        Ok(())
    }
}
