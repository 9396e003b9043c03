//! Monitor response types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use studylab_core::ServiceStatus;

/// Landing information served at `/`.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiIndex {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Short description of the API.
    pub description: String,
    /// Path of the interactive API documentation.
    pub docs: String,
    /// Path of the health check.
    pub health: String,
}

/// Server health status.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    /// Overall server health.
    pub status: ServiceStatus,
    /// Application version.
    pub version: String,
    /// Whether debug mode is enabled.
    pub debug: bool,
}

/// Capabilities of the chat backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub streaming: bool,
    pub tools: bool,
    /// Web search is available.
    pub advanced_tools: bool,
    /// Names of the accepted agent modes.
    pub modes: Vec<String>,
}

/// Server configuration summary served at `/info`.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    /// Model used for every chat turn.
    pub model: String,
    pub features: Features,
}
