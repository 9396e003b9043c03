//! Agent execution: modes, the tool loop and the messages it produces.
//!
//! [`ChatAgent`] drives a [`CompletionProvider`](crate::provider::CompletionProvider)
//! through rounds of completions and tool calls. Every observation is
//! yielded as an [`AgentEvent`] for the relay to translate into chunks.

mod executor;
mod message;
mod mode;

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

pub use executor::ChatAgent;
pub use message::{
    AgentEvent, AgentMessage, AiMessage, RequestedToolCall, ToolMessage, ToolStatus,
};
pub use mode::AgentMode;

use crate::{Error, Result};

/// Default number of completion rounds per turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Limits applied to every agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct AgentConfig {
    /// Maximum number of completion rounds per turn (1-100).
    #[cfg_attr(
        feature = "config",
        arg(long, env = "AGENT_MAX_ITERATIONS", default_value_t = DEFAULT_MAX_ITERATIONS)
    )]
    pub max_iterations: usize,

    /// Optional deadline of a whole turn, in seconds.
    #[cfg_attr(feature = "config", arg(long, env = "AGENT_MAX_EXECUTION_TIME"))]
    pub max_execution_time: Option<u64>,
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_execution_time(mut self, max_execution_time: Duration) -> Self {
        self.max_execution_time = Some(max_execution_time.as_secs().max(1));
        self
    }

    /// Returns the turn deadline, if any.
    pub fn max_execution_time(&self) -> Option<Duration> {
        self.max_execution_time.map(Duration::from_secs)
    }

    /// Validates the limits.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.max_iterations) {
            return Err(Error::config(format!(
                "max iterations must be between 1 and 100, got {}",
                self.max_iterations
            )));
        }
        if self.max_execution_time == Some(0) {
            return Err(Error::config("max execution time must be positive"));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_execution_time: None,
        }
    }
}
