//! Tool registry for managing available tools.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde_json::{Map, Value};

use crate::agent::{RequestedToolCall, ToolMessage};

/// Tracing target for tool execution.
const TRACING_TARGET: &str = "studylab_rig::tool";

/// Handler executing a tool with JSON arguments.
///
/// Resolves to the text fed back to the model, or an error description.
pub type ToolHandler = Arc<dyn Fn(Map<String, Value>) -> HandlerFuture + Send + Sync>;

/// Future returned by a [`ToolHandler`].
pub type HandlerFuture = BoxFuture<'static, std::result::Result<String, String>>;

/// Registry of available tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rig tool under its own name.
    pub async fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let definition = tool.definition(String::new()).await;
        let tool = Arc::new(tool);

        let handler: ToolHandler = Arc::new(move |args: Map<String, Value>| -> HandlerFuture {
            let tool = Arc::clone(&tool);
            Box::pin(async move {
                let args: T::Args = serde_json::from_value(Value::Object(args))
                    .map_err(|e| format!("invalid arguments: {e}"))?;
                let output = tool.call(args).await.map_err(|e| e.to_string())?;
                render_output(&output)
            })
        });

        self.register_handler(definition, handler);
    }

    /// Registers a definition with a custom handler.
    pub fn register_handler(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        let name = definition.name.clone();
        self.definitions.retain(|existing| existing.name != name);
        self.definitions.push(definition);
        self.handlers.insert(name, handler);
    }

    /// Returns all tool definitions in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns the names of all registered tools.
    pub fn names(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.name.clone()).collect()
    }

    /// Returns whether a tool exists.
    pub fn has_tool(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Executes a tool call.
    ///
    /// Failures never propagate: they become error [`ToolMessage`]s so the
    /// model can continue the turn.
    pub async fn execute(&self, call: &RequestedToolCall) -> ToolMessage {
        let Some(handler) = self.handlers.get(&call.name) else {
            tracing::warn!(target: TRACING_TARGET, tool = %call.name, "unknown tool requested");
            return ToolMessage::error(
                &call.id,
                &call.name,
                format!("tool '{}' not found", call.name),
            );
        };

        tracing::debug!(target: TRACING_TARGET, tool = %call.name, id = %call.id, "executing tool");
        match handler(call.args.clone()).await {
            Ok(output) => ToolMessage::success(&call.id, &call.name, output),
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    tool = %call.name,
                    id = %call.id,
                    %error,
                    "tool execution failed"
                );
                ToolMessage::error(&call.id, &call.name, error)
            }
        }
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Strings are passed through verbatim, anything else as JSON.
fn render_output<T: serde::Serialize>(output: &T) -> std::result::Result<String, String> {
    match serde_json::to_value(output).map_err(|e| e.to_string())? {
        Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
