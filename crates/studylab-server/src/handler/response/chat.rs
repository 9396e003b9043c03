//! Chat response types.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use studylab_core::ServiceStatus;

/// Health of the chat service.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatHealth {
    pub status: ServiceStatus,
    /// Always `chat`.
    pub service: String,
    pub version: String,
}

/// Available agent modes.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatModes {
    /// Mode name mapped to a one-line description.
    pub modes: BTreeMap<String, String>,
    /// Mode used when a request names none or an unknown one.
    pub default: String,
}
