//! Derived metadata attached to an assistant message.
//!
//! These payloads are produced by best-effort extraction on the server and
//! rendered as separate panels by clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model reasoning shown separately from the answer.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Reasoning {
    pub content: String,
    /// Thinking time in seconds, `0.0` when unknown.
    #[serde(default)]
    pub duration: f64,
}

/// A document the answer draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Source {
    pub href: String,
    pub title: String,
}

/// Status of a plan step or queued item.
///
/// Kept as a string on the wire since producers use free-form values.
pub type ItemStatus = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub status: ItemStatus,
}

/// A numbered plan found in the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Plan {
    pub title: String,
    pub description: String,
    pub steps: Vec<PlanStep>,
}

/// A checklist entry found in the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

/// Pending work reported by the agent context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct QueueItem {
    pub id: String,
    pub title: String,
    pub status: ItemStatus,
}

/// A `[n]` marker inside the answer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Citation {
    pub index: u32,
    /// Byte offset of the marker in the message content.
    pub position: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ChainOfThoughtStep {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub status: ItemStatus,
    /// Provider-specific extras carried through untouched.
    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ChainOfThought {
    pub steps: Vec<ChainOfThoughtStep>,
}
