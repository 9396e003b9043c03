//! Chat request types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use studylab_core::types::{self, DEFAULT_MODE, HistoryMessage};
use validator::Validate;

/// Request payload of `POST /chat` and `POST /chat/stream`.
///
/// Field names stay in snake case to match existing clients.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SendChatMessage {
    /// The user's message.
    #[validate(length(min = 1, max = 32000))]
    pub message: String,
    /// Prior turns of the conversation, oldest first.
    #[serde(default)]
    pub chat_history: Option<Vec<HistoryMessage>>,
    /// Agent mode; unknown names fall back to `default`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Offer the basic tools to the model.
    #[serde(default = "default_true")]
    pub use_tools: bool,
    /// Also offer web search when it is configured.
    #[serde(default)]
    pub use_advanced_tools: bool,
    /// Accepted for compatibility; the endpoint decides whether to stream.
    #[serde(default)]
    pub streaming: bool,
}

impl SendChatMessage {
    /// Converts this request into the chat service request.
    pub fn into_request(self) -> types::ChatRequest {
        let mut request = types::ChatRequest::new(self.message)
            .with_mode(self.mode)
            .with_tools(self.use_tools)
            .with_advanced_tools(self.use_advanced_tools);
        request.chat_history = self.chat_history;
        request.streaming = self.streaming;
        request
    }
}

fn default_mode() -> String {
    DEFAULT_MODE.to_owned()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use studylab_core::types::MessageRole;

    use super::*;

    #[test]
    fn defaults_match_the_chat_request() -> anyhow::Result<()> {
        let request: SendChatMessage = serde_json::from_value(json!({"message": "你好"}))?;
        let request = request.into_request();

        assert_eq!(request.mode, "default");
        assert!(request.use_tools);
        assert!(!request.use_advanced_tools);
        assert!(request.history().is_empty());
        Ok(())
    }

    #[test]
    fn history_is_carried_over() -> anyhow::Result<()> {
        let request: SendChatMessage = serde_json::from_value(json!({
            "message": "继续",
            "mode": "coding",
            "chat_history": [{"role": "user", "content": "写一个排序"}],
            "use_advanced_tools": true
        }))?;
        let request = request.into_request();

        assert_eq!(request.mode, "coding");
        assert!(request.use_advanced_tools);
        assert_eq!(request.history()[0].role, MessageRole::User);
        Ok(())
    }

    #[test]
    fn message_length_is_validated() {
        let empty = SendChatMessage {
            message: String::new(),
            chat_history: None,
            mode: default_mode(),
            use_tools: true,
            use_advanced_tools: false,
            streaming: false,
        };
        assert!(empty.validate().is_err());

        let long = SendChatMessage {
            message: "字".repeat(32001),
            ..empty.clone()
        };
        assert!(long.validate().is_err());

        let ok = SendChatMessage {
            message: "字".repeat(32000),
            ..empty
        };
        assert!(ok.validate().is_ok());
    }
}
