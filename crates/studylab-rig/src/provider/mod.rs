//! Streaming completion providers.
//!
//! A [`CompletionProvider`] turns a [`CompletionRequest`] into a stream of
//! [`CompletionDelta`]s. The agent loop owns accumulation; providers only
//! translate their wire format.

mod config;
#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod openai;
mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};

pub use config::ProviderConfig;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{ScriptedProvider, ScriptedTurn};
pub use openai::OpenAiProvider;
pub use sse::{SseEvent, SseStream};

use crate::Result;
use crate::agent::RequestedToolCall;

/// Stream of deltas produced by one completion round.
pub type CompletionStream = BoxStream<'static, Result<CompletionDelta>>;

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum PromptMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<RequestedToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Input of one completion round.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Fragment of a tool call as streamed by the model.
///
/// Fragments sharing an `index` belong to the same call; `id` and `name`
/// usually arrive with the first fragment only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// Token counts reported by the provider for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
}

/// One increment of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionDelta {
    pub text: Option<String>,
    /// Reasoning text from models that stream it separately.
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub usage: Option<ProviderUsage>,
    pub finish_reason: Option<String>,
}

impl CompletionDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// A chat model able to stream completions.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the model identifier used for context window lookups.
    fn model_id(&self) -> &str;

    /// Starts one completion round.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream>;
}
