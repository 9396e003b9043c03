//! Messages produced while an agent runs a turn.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl RequestedToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Snapshot of an assistant message.
///
/// Snapshots of the same message share its `id` and carry the full content
/// generated so far, not just the latest increment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiMessage {
    pub id: String,
    pub content: String,
    pub tool_calls: Vec<RequestedToolCall>,
    /// Provider-specific extras such as `reasoning`, `sources` or `suggestions`.
    pub response_metadata: Map<String, Value>,
    /// Token counts, present once the round has completed.
    pub usage_metadata: Option<Value>,
}

impl AiMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_tool_call(mut self, call: RequestedToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.response_metadata.insert(key.into(), value);
        self
    }

    pub fn with_usage(mut self, usage: Value) -> Self {
        self.usage_metadata = Some(usage);
        self
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Success,
    Error,
}

/// Result of one tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolMessage {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub status: ToolStatus,
}

impl ToolMessage {
    pub fn success(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            status: ToolStatus::Success,
        }
    }

    pub fn error(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            status: ToolStatus::Error,
        }
    }
}

/// A message observed on the agent stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    Ai(AiMessage),
    Tool(ToolMessage),
}

impl AgentMessage {
    /// Returns the text content of the message.
    pub fn content(&self) -> &str {
        match self {
            Self::Ai(message) => &message.content,
            Self::Tool(message) => &message.content,
        }
    }
}

impl From<AiMessage> for AgentMessage {
    fn from(message: AiMessage) -> Self {
        Self::Ai(message)
    }
}

impl From<ToolMessage> for AgentMessage {
    fn from(message: ToolMessage) -> Self {
        Self::Tool(message)
    }
}

/// Item of the agent event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A new or updated message.
    Message(AgentMessage),
    /// Extra context for extraction, such as retrieved documents or a queue.
    Context(Map<String, Value>),
}

impl From<AiMessage> for AgentEvent {
    fn from(message: AiMessage) -> Self {
        Self::Message(AgentMessage::Ai(message))
    }
}

impl From<ToolMessage> for AgentEvent {
    fn from(message: ToolMessage) -> Self {
        Self::Message(AgentMessage::Tool(message))
    }
}
