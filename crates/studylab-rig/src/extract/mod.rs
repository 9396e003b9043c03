//! Best-effort extraction of UI enrichments from agent messages.
//!
//! Every extractor is an ordered list of strategies: the first one that
//! matches wins, and a message matching none yields `None`. Extraction
//! never fails and never mutates its input.

mod planning;
mod reasoning;
mod sources;
mod tools;

use serde_json::{Map, Value};
use studylab_core::types::{
    ChainOfThought, Citation, Plan, QueueItem, Reasoning, Source, Task, ToolCall, ToolResult,
};

pub use planning::{extract_chain_of_thought, extract_plan, extract_queue, extract_tasks};
pub use reasoning::extract_reasoning;
pub use sources::{extract_citations, extract_sources};
pub use tools::{extract_tool_calls, extract_tool_result};

use crate::agent::{AgentMessage, AiMessage};

/// Tracing target for extraction.
const TRACING_TARGET: &str = "studylab_rig::extract";

/// One way of deriving a value from an AI message.
type Strategy<T> = fn(&AiMessage) -> Option<T>;

/// Runs strategies in order and returns the first hit.
fn first_match<T>(message: &AgentMessage, strategies: &[Strategy<T>]) -> Option<T> {
    let AgentMessage::Ai(message) = message else {
        return None;
    };
    strategies.iter().find_map(|strategy| strategy(message))
}

/// Returns `None` for empty lists.
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

/// Reads follow-up suggestions from `response_metadata.suggestions`.
pub fn extract_suggestions(message: &AgentMessage) -> Option<Vec<String>> {
    first_match::<Vec<String>>(message, &[suggestions_from_metadata])
}

fn suggestions_from_metadata(message: &AiMessage) -> Option<Vec<String>> {
    let suggestions = message.response_metadata.get("suggestions")?.as_array()?;
    non_empty(
        suggestions
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
    )
}

/// Everything extracted from one message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extracted {
    pub reasoning: Option<Reasoning>,
    pub tools: Option<Vec<ToolCall>>,
    pub tool_result: Option<ToolResult>,
    pub sources: Option<Vec<Source>>,
    pub plan: Option<Plan>,
    pub tasks: Option<Vec<Task>>,
    pub chain_of_thought: Option<ChainOfThought>,
    pub queue: Option<Vec<QueueItem>>,
    pub citations: Option<Vec<Citation>>,
    pub suggestions: Option<Vec<String>>,
}

impl Extracted {
    /// Returns true when nothing was found.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Runs every extractor against a message and a shared context.
///
/// The context holds out-of-band data such as `retrieved_docs`, `queue` or
/// `pending_tasks`.
#[derive(Debug, Default, Clone)]
pub struct MessageExtractor {
    context: Map<String, Value>,
}

impl MessageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Replaces the context.
    pub fn set_context(&mut self, context: Map<String, Value>) {
        self.context = context;
    }

    /// Merges entries into the context.
    pub fn extend_context(&mut self, context: Map<String, Value>) {
        self.context.extend(context);
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Extracts every enrichment from a message.
    pub fn extract_all(&self, message: &AgentMessage) -> Extracted {
        let citations = match message {
            AgentMessage::Ai(ai) => non_empty(extract_citations(&ai.content)),
            AgentMessage::Tool(_) => None,
        };

        Extracted {
            reasoning: extract_reasoning(message),
            tools: non_empty(extract_tool_calls(message)),
            tool_result: extract_tool_result(message),
            sources: non_empty(extract_sources(message, &self.context)),
            plan: extract_plan(message),
            tasks: non_empty(extract_tasks(message)),
            chain_of_thought: extract_chain_of_thought(message),
            queue: non_empty(extract_queue(&self.context)),
            citations,
            suggestions: extract_suggestions(message),
        }
    }
}
