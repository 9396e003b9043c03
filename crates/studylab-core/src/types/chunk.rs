//! The enhanced chat stream wire format.
//!
//! Every `data:` frame of the stream carries exactly one [`StreamChunk`]
//! serialized as a JSON object tagged by its `type` field.

use serde::{Deserialize, Serialize};

use super::{
    ChainOfThought, Citation, ContextUsage, Plan, QueueItem, Reasoning, Source, Task, ToolCall,
    ToolResult,
};
use crate::{Error, Result};

/// Message carried by the `start` chunk.
pub const START_MESSAGE: &str = "开始生成...";

/// Message carried by the `end` chunk.
pub const END_MESSAGE: &str = "生成完成";

/// User-facing message carried by the `error` chunk.
pub const ERROR_MESSAGE: &str = "抱歉，处理您的请求时出现错误";

/// One frame of the enhanced chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Start {
        message: String,
    },
    /// New suffix of the assistant's answer.
    Chunk {
        content: String,
    },
    Tool {
        data: ToolCall,
    },
    ToolResult {
        data: ToolResult,
    },
    Reasoning {
        data: Reasoning,
    },
    Source {
        data: Source,
    },
    Sources {
        data: Vec<Source>,
    },
    Plan {
        data: Plan,
    },
    Task {
        data: Task,
    },
    Queue {
        data: Vec<QueueItem>,
    },
    Context {
        data: ContextUsage,
    },
    Citation {
        data: Citation,
    },
    #[serde(rename = "chainOfThought")]
    ChainOfThought {
        data: ChainOfThought,
    },
    Suggestions {
        data: Vec<String>,
    },
    End {
        message: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StreamChunk {
    pub fn start() -> Self {
        Self::Start {
            message: START_MESSAGE.to_owned(),
        }
    }

    pub fn end() -> Self {
        Self::End {
            message: END_MESSAGE.to_owned(),
        }
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk {
            content: content.into(),
        }
    }

    /// Creates an error chunk with the fixed user-facing message.
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            message: ERROR_MESSAGE.to_owned(),
            error: Some(detail.into()),
        }
    }

    /// Returns the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Chunk { .. } => "chunk",
            Self::Tool { .. } => "tool",
            Self::ToolResult { .. } => "tool_result",
            Self::Reasoning { .. } => "reasoning",
            Self::Source { .. } => "source",
            Self::Sources { .. } => "sources",
            Self::Plan { .. } => "plan",
            Self::Task { .. } => "task",
            Self::Queue { .. } => "queue",
            Self::Context { .. } => "context",
            Self::Citation { .. } => "citation",
            Self::ChainOfThought { .. } => "chainOfThought",
            Self::Suggestions { .. } => "suggestions",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
        }
    }

    /// Returns `true` for chunks after which nothing else is sent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End { .. } | Self::Error { .. })
    }

    /// Serializes the chunk into a single-line JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::serialization()
                .with_message(format!("failed to encode {} chunk", self.kind()))
                .with_source(e)
        })
    }

    /// Parses one frame payload.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| {
            Error::invalid_input()
                .with_message("malformed stream chunk")
                .with_source(e)
        })
    }

    /// Formats the chunk as one server-sent event frame.
    pub fn to_sse_frame(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}
