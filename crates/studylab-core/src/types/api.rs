//! HTTP request and response bodies of the chat API.

use serde::{Deserialize, Serialize};

use super::MessageRole;

/// Default agent mode name.
pub const DEFAULT_MODE: &str = "default";

/// User-facing message of a failed non-streaming turn.
pub const CHAT_ERROR_MESSAGE: &str = "抱歉，处理您的请求时出现错误。";

/// A prior conversation entry sent along with a new message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat` and `POST /chat/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<HistoryMessage>>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_true")]
    pub use_tools: bool,
    #[serde(default)]
    pub use_advanced_tools: bool,
    #[serde(default)]
    pub streaming: bool,
}

impl ChatRequest {
    /// Creates a request with default options.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chat_history: None,
            mode: default_mode(),
            use_tools: true,
            use_advanced_tools: false,
            streaming: false,
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.chat_history = Some(history);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_tools(mut self, use_tools: bool) -> Self {
        self.use_tools = use_tools;
        self
    }

    pub fn with_advanced_tools(mut self, use_advanced_tools: bool) -> Self {
        self.use_advanced_tools = use_advanced_tools;
        self
    }

    /// Returns the history, or an empty slice.
    pub fn history(&self) -> &[HistoryMessage] {
        self.chat_history.as_deref().unwrap_or_default()
    }
}

/// Body returned by `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ChatResponse {
    pub message: String,
    pub mode: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn success(message: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            mode: mode.into(),
            tools_used: Vec::new(),
            success: true,
            error: None,
        }
    }

    /// Creates the response of a failed turn.
    pub fn failure(mode: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: CHAT_ERROR_MESSAGE.to_owned(),
            mode: mode.into(),
            tools_used: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn with_tools_used(mut self, tools_used: Vec<String>) -> Self {
        self.tools_used = tools_used;
        self
    }
}

fn default_mode() -> String {
    DEFAULT_MODE.to_owned()
}

fn default_true() -> bool {
    true
}
