//! Reassembled chat messages.
//!
//! An [`EnhancedMessage`] is the client-side view of one conversation entry:
//! the plain text plus one optional slot for every kind of derived metadata
//! the stream can deliver.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{
    ChainOfThought, Citation, ContextUsage, Plan, QueueItem, Reasoning, Source, Task, ToolCall,
};

/// Metadata key holding follow-up suggestions.
pub const METADATA_SUGGESTIONS: &str = "suggestions";

/// Metadata key holding a failure detail.
pub const METADATA_ERROR: &str = "error";

/// Role of a message participant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString
)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A chat message with its accumulated enrichments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct EnhancedMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    pub timestamp: Timestamp,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queue: Vec<QueueItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_usage: Option<ContextUsage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_of_thought: Option<ChainOfThought>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl EnhancedMessage {
    /// Creates an empty message with a fresh time-ordered id.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), role, content)
    }

    pub fn with_id(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Timestamp::now(),
            tools: Vec::new(),
            sources: Vec::new(),
            reasoning: None,
            plan: None,
            tasks: Vec::new(),
            queue: Vec::new(),
            context_usage: None,
            citations: Vec::new(),
            chain_of_thought: None,
            metadata: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an empty assistant message to stream into.
    pub fn assistant() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }

    /// Returns the tool call registered under `id`.
    pub fn tool(&self, id: &str) -> Option<&ToolCall> {
        self.tools.iter().find(|tool| tool.id == id)
    }

    /// Returns follow-up suggestions stored in the metadata.
    pub fn suggestions(&self) -> Vec<String> {
        self.metadata
            .get(METADATA_SUGGESTIONS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the recorded failure detail, if any.
    pub fn error(&self) -> Option<&str> {
        self.metadata.get(METADATA_ERROR).and_then(Value::as_str)
    }
}
