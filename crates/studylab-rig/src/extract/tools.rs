use serde_json::Value;
use studylab_core::types::{ToolCall, ToolResult};

use crate::agent::{AgentMessage, ToolStatus};

/// Lists the tool calls requested by an AI message, in `input-available` state.
pub fn extract_tool_calls(message: &AgentMessage) -> Vec<ToolCall> {
    let AgentMessage::Ai(message) = message else {
        return Vec::new();
    };

    message
        .tool_calls
        .iter()
        .map(|call| ToolCall::new(&call.id, &call.name, call.args.clone()))
        .collect()
}

/// Converts a tool message into the result of its call.
pub fn extract_tool_result(message: &AgentMessage) -> Option<ToolResult> {
    let AgentMessage::Tool(message) = message else {
        return None;
    };

    let result = match message.status {
        ToolStatus::Error => ToolResult::error(&message.tool_call_id, &message.content),
        ToolStatus::Success => {
            ToolResult::output(&message.tool_call_id, Value::String(message.content.clone()))
        }
    };
    Some(result)
}
