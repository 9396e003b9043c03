//! Translation of agent events into enhanced stream chunks.
//!
//! A [`StreamRelay`] lives for one turn. It sends assistant text as
//! incremental suffixes, announces tool calls and their results, and once
//! the agent finishes emits every enrichment found in the final message,
//! the context usage and `end`. Any error ends the stream with a single
//! `error` chunk.

mod state;

use std::collections::{HashMap, HashSet};
use std::fmt;

use futures::{Stream, StreamExt};
pub use state::RelayState;
use studylab_core::types::{StreamChunk, ToolCall};

use crate::Result;
use crate::agent::{AgentEvent, AgentMessage, AiMessage, ToolMessage};
use crate::extract::{MessageExtractor, extract_tool_calls, extract_tool_result};
use crate::usage::UsageTracker;

/// Tracing target for the relay.
const TRACING_TARGET: &str = "studylab_rig::relay";

/// Per-turn translator from [`AgentEvent`]s to [`StreamChunk`]s.
#[derive(Debug)]
pub struct StreamRelay {
    state: RelayState,
    use_tools: bool,
    tracker: UsageTracker,
    extractor: MessageExtractor,
    /// Id of the AI message whose text is being streamed.
    current_id: Option<String>,
    /// Text of the current message already sent to the client.
    sent: String,
    tool_calls: HashMap<String, ToolCall>,
    /// AI messages whose usage has been counted.
    counted: HashSet<String>,
    last_message: Option<AgentMessage>,
}

impl StreamRelay {
    pub fn new(model_id: impl Into<String>, use_tools: bool) -> Self {
        Self {
            state: RelayState::Init,
            use_tools,
            tracker: UsageTracker::new(model_id),
            extractor: MessageExtractor::new(),
            current_id: None,
            sent: String::new(),
            tool_calls: HashMap::new(),
            counted: HashSet::new(),
            last_message: None,
        }
    }

    /// Seeds the extractor context, e.g. with retrieved documents.
    pub fn with_context(mut self, extractor: MessageExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Returns the tool calls registered so far.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.tool_calls.values()
    }

    /// Translates one agent event.
    pub fn handle(&mut self, event: AgentEvent) -> Vec<StreamChunk> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.transition(RelayState::Streaming);

        match event {
            AgentEvent::Context(context) => {
                self.extractor.extend_context(context);
                Vec::new()
            }
            AgentEvent::Message(AgentMessage::Ai(message)) => self.on_ai_message(message),
            AgentEvent::Message(AgentMessage::Tool(message)) => {
                self.on_tool_message(message).into_iter().collect()
            }
        }
    }

    /// Emits enrichments, context usage and `end`.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.transition(RelayState::Finalizing);

        let mut chunks = Vec::new();
        if let Some(message) = self.last_message.take() {
            let extracted = self.extractor.extract_all(&message);

            if let Some(data) = extracted.reasoning {
                chunks.push(StreamChunk::Reasoning { data });
            }
            if let Some(data) = extracted.sources {
                chunks.push(StreamChunk::Sources { data });
            }
            if let Some(data) = extracted.plan {
                chunks.push(StreamChunk::Plan { data });
            }
            for data in extracted.tasks.unwrap_or_default() {
                chunks.push(StreamChunk::Task { data });
            }
            if let Some(data) = extracted.chain_of_thought {
                chunks.push(StreamChunk::ChainOfThought { data });
            }
            if let Some(data) = extracted.queue {
                chunks.push(StreamChunk::Queue { data });
            }
            for data in extracted.citations.unwrap_or_default() {
                chunks.push(StreamChunk::Citation { data });
            }
            if let Some(data) = extracted.suggestions {
                chunks.push(StreamChunk::Suggestions { data });
            }
        }

        self.tracker.log_summary();
        chunks.push(StreamChunk::Context {
            data: self.tracker.usage_info(),
        });
        chunks.push(StreamChunk::end());

        self.transition(RelayState::Done);
        chunks
    }

    /// Fails the turn, returning the `error` chunk unless already finished.
    pub fn fail(&mut self, error: &dyn fmt::Display) -> Option<StreamChunk> {
        if self.state.is_terminal() {
            return None;
        }
        tracing::error!(target: TRACING_TARGET, %error, "stream failed");
        self.transition(RelayState::Error);
        Some(StreamChunk::error(error.to_string()))
    }

    /// Relays a whole agent stream.
    pub fn relay<S>(mut self, events: S) -> impl Stream<Item = StreamChunk> + Send + 'static
    where
        S: Stream<Item = Result<AgentEvent>> + Send + 'static,
    {
        async_stream::stream! {
            let mut events = Box::pin(events);

            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        for chunk in self.handle(event) {
                            yield chunk;
                        }
                    }
                    Err(error) => {
                        if let Some(chunk) = self.fail(&error) {
                            yield chunk;
                        }
                        return;
                    }
                }
            }

            for chunk in self.finish() {
                yield chunk;
            }
        }
    }

    fn on_ai_message(&mut self, message: AiMessage) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();

        if self.current_id.as_deref() != Some(message.id.as_str()) {
            self.current_id = Some(message.id.clone());
            self.sent.clear();
        }

        match message.content.strip_prefix(self.sent.as_str()) {
            Some("") => {}
            Some(delta) => {
                chunks.push(StreamChunk::chunk(delta));
                self.sent.clone_from(&message.content);
            }
            None => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    id = %message.id,
                    sent = self.sent.len(),
                    received = message.content.len(),
                    "message content does not extend what was sent, resynchronizing"
                );
                self.sent.clone_from(&message.content);
            }
        }

        let message = AgentMessage::Ai(message);
        if self.use_tools {
            for call in extract_tool_calls(&message) {
                if self.tool_calls.contains_key(&call.id) {
                    continue;
                }
                tracing::debug!(target: TRACING_TARGET, id = %call.id, tool = %call.name, "tool call requested");
                self.tool_calls.insert(call.id.clone(), call.clone());
                chunks.push(StreamChunk::Tool { data: call });
            }
        }

        self.record(message);
        chunks
    }

    fn record(&mut self, message: AgentMessage) {
        if let AgentMessage::Ai(ai) = &message
            && let Some(usage) = &ai.usage_metadata
            && self.counted.insert(ai.id.clone())
        {
            self.tracker.update_from_usage(usage);
        }
        self.last_message = Some(message);
    }

    fn on_tool_message(&mut self, message: ToolMessage) -> Option<StreamChunk> {
        if !self.use_tools {
            return None;
        }

        let result = extract_tool_result(&AgentMessage::Tool(message))?;
        let Some(call) = self.tool_calls.get_mut(&result.id) else {
            tracing::warn!(target: TRACING_TARGET, id = %result.id, "dropping result of unknown tool call");
            return None;
        };
        if call.state.is_terminal() {
            tracing::warn!(target: TRACING_TARGET, id = %result.id, "dropping repeated tool result");
            return None;
        }

        call.apply(&result);
        tracing::debug!(target: TRACING_TARGET, id = %result.id, state = %result.state, "tool call finished");
        Some(StreamChunk::ToolResult { data: result })
    }

    fn transition(&mut self, next: RelayState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(target: TRACING_TARGET, from = %self.state, to = %next, "invalid relay transition");
            return;
        }
        tracing::debug!(target: TRACING_TARGET, from = %self.state, to = %next, "relay transition");
        self.state = next;
    }
}
