//! Tool invocation types.
//!
//! A [`ToolCall`] is registered once per tool request within an assistant turn
//! and is later completed by a [`ToolResult`] carrying the same id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle state of a tool call.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    AsRefStr, Display, EnumString
)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ToolState {
    /// Arguments are still being streamed by the model.
    InputStreaming,
    /// Arguments are complete and the tool is about to run.
    #[default]
    InputAvailable,
    /// The tool finished and produced a result.
    OutputAvailable,
    /// The tool failed.
    OutputError,
    /// The call was rejected before execution.
    OutputDenied,
    /// Waiting for user approval.
    ApprovalRequested,
    /// The user answered an approval request.
    ApprovalResponded,
}

impl ToolState {
    /// Returns `true` once the call can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::OutputAvailable | Self::OutputError | Self::OutputDenied
        )
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ToolCall {
    /// Tool call id assigned by the model provider.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Display type, always `tool-call-<name>`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Current lifecycle state.
    pub state: ToolState,
    /// Arguments the model supplied.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    /// Creates a call in the `input-available` state.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            kind: format!("tool-call-{name}"),
            name,
            state: ToolState::InputAvailable,
            parameters,
            result: None,
            error: None,
        }
    }

    /// Applies a result to this call.
    ///
    /// Results for a different id are ignored.
    pub fn apply(&mut self, result: &ToolResult) -> bool {
        if result.id != self.id {
            return false;
        }

        self.state = result.state;
        if result.result.is_some() {
            self.result = result.result.clone();
        }
        if result.error.is_some() {
            self.error = result.error.clone();
        }
        true
    }
}

/// Completion of a previously announced [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ToolResult {
    /// Id of the [`ToolCall`] this result completes.
    pub id: String,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Creates a successful result.
    pub fn output(id: impl Into<String>, result: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            state: ToolState::OutputAvailable,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Creates a failed result.
    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ToolState::OutputError,
            result: None,
            error: Some(error.into()),
        }
    }
}
