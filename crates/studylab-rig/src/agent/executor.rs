//! The tool loop driving one conversation turn.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value, json};
use studylab_core::types::{HistoryMessage, MessageRole};
use uuid::Uuid;

use super::{AgentConfig, AgentEvent, AgentMessage, AgentMode, AiMessage, RequestedToolCall};
use super::{ToolMessage, ToolStatus};
use crate::provider::{
    CompletionDelta, CompletionProvider, CompletionRequest, PromptMessage, ProviderUsage,
};
use crate::tool::ToolRegistry;
use crate::{Error, Result};

/// Tracing target for agent execution.
const TRACING_TARGET: &str = "studylab_rig::agent";

/// Conversational agent with optional tools.
///
/// Cheap to build per request: the provider and the registry are shared.
#[derive(Clone)]
pub struct ChatAgent {
    provider: Arc<dyn CompletionProvider>,
    tools: Arc<ToolRegistry>,
    mode: AgentMode,
    config: AgentConfig,
}

impl ChatAgent {
    /// Creates an agent for the given mode.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        tools: Arc<ToolRegistry>,
        mode: AgentMode,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            mode,
            config,
        }
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// Returns the names of the tools offered to the model.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    /// Runs one turn, yielding every message as it evolves.
    ///
    /// AI messages are yielded as growing snapshots sharing one id per
    /// completion round; the last snapshot of a round carries its tool
    /// calls, reasoning and usage.
    pub fn stream(
        &self,
        input: &str,
        history: &[HistoryMessage],
    ) -> BoxStream<'static, Result<AgentEvent>> {
        let messages = self.prompt(input, history);
        let events = run_turn(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            messages,
            self.config.max_iterations,
        );

        match self.config.max_execution_time() {
            Some(limit) => with_deadline(events, limit).boxed(),
            None => events.boxed(),
        }
    }

    /// Runs one turn to completion and returns the generated text.
    pub async fn invoke(&self, input: &str, history: &[HistoryMessage]) -> Result<String> {
        let mut events = self.stream(input, history);
        let mut rounds: Vec<(String, String)> = Vec::new();

        while let Some(event) = events.next().await {
            let AgentEvent::Message(AgentMessage::Ai(message)) = event? else {
                continue;
            };
            match rounds.last_mut() {
                Some((id, content)) if *id == message.id => *content = message.content,
                _ => rounds.push((message.id, message.content)),
            }
        }

        Ok(rounds.into_iter().map(|(_, content)| content).collect())
    }

    fn prompt(&self, input: &str, history: &[HistoryMessage]) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::system(
            self.mode.prompt_with_tools(!self.tools.is_empty()),
        ));
        messages.extend(history.iter().map(|entry| match entry.role {
            MessageRole::User => PromptMessage::user(&entry.content),
            MessageRole::Assistant => PromptMessage::assistant(&entry.content),
            MessageRole::System => PromptMessage::system(&entry.content),
        }));
        messages.push(PromptMessage::user(input));
        messages
    }
}

impl std::fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAgent")
            .field("model", &self.provider.model_id())
            .field("tools", &self.tools)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .finish()
    }
}

fn run_turn(
    provider: Arc<dyn CompletionProvider>,
    tools: Arc<ToolRegistry>,
    mut messages: Vec<PromptMessage>,
    max_iterations: usize,
) -> impl Stream<Item = Result<AgentEvent>> + Send + 'static {
    try_stream! {
        let definitions = tools.definitions().to_vec();

        for iteration in 1.. {
            if iteration > max_iterations {
                Err::<(), _>(Error::agent(format!(
                    "turn exceeded {max_iterations} iterations"
                )))?;
            }

            tracing::debug!(target: TRACING_TARGET, iteration, "starting completion round");
            let request = CompletionRequest {
                messages: messages.clone(),
                tools: definitions.clone(),
            };
            let mut deltas = provider.stream(request).await?;

            let mut round = Round::new(Uuid::now_v7().to_string());
            while let Some(delta) = deltas.next().await {
                if round.apply(delta?) {
                    yield AgentEvent::from(round.snapshot());
                }
            }

            let (message, invalid) = round.finish();
            let calls = message.tool_calls.clone();
            let content = message.content.clone();
            yield AgentEvent::from(message);

            if calls.is_empty() {
                tracing::debug!(target: TRACING_TARGET, iteration, "turn finished");
                break;
            }

            messages.push(PromptMessage::Assistant {
                content,
                tool_calls: calls.clone(),
            });

            for call in &calls {
                let result = match invalid.get(&call.id) {
                    Some(error) => ToolMessage::error(&call.id, &call.name, error),
                    None => tools.execute(call).await,
                };
                if result.status == ToolStatus::Error {
                    tracing::debug!(target: TRACING_TARGET, tool = %call.name, "tool call failed");
                }
                messages.push(PromptMessage::Tool {
                    tool_call_id: result.tool_call_id.clone(),
                    content: result.content.clone(),
                });
                yield AgentEvent::from(result);
            }
        }
    }
}

/// Fails the turn once `limit` has elapsed since it started.
fn with_deadline<S>(events: S, limit: Duration) -> impl Stream<Item = Result<AgentEvent>> + Send
where
    S: Stream<Item = Result<AgentEvent>> + Send + 'static,
{
    try_stream! {
        let deadline = tokio::time::Instant::now() + limit;
        let mut events = Box::pin(events);

        loop {
            match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(Some(event)) => yield event?,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(target: TRACING_TARGET, ?limit, "turn timed out");
                    Err::<(), _>(Error::Timeout(limit))?;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates the deltas of one completion round.
#[derive(Debug)]
struct Round {
    message: AiMessage,
    calls: BTreeMap<usize, PendingCall>,
    reasoning: String,
    reasoning_started: Option<Instant>,
    reasoning_elapsed: Duration,
    usage: Option<ProviderUsage>,
}

impl Round {
    fn new(id: String) -> Self {
        Self {
            message: AiMessage::new(id),
            calls: BTreeMap::new(),
            reasoning: String::new(),
            reasoning_started: None,
            reasoning_elapsed: Duration::ZERO,
            usage: None,
        }
    }

    /// Applies a delta, returning whether the text grew.
    fn apply(&mut self, delta: CompletionDelta) -> bool {
        if let Some(reasoning) = delta.reasoning.filter(|r| !r.is_empty()) {
            let started = *self.reasoning_started.get_or_insert_with(Instant::now);
            self.reasoning.push_str(&reasoning);
            self.reasoning_elapsed = started.elapsed();
        }

        for fragment in delta.tool_calls {
            let pending = self.calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                pending.id = Some(id);
            }
            if let Some(name) = fragment.name {
                pending.name.push_str(&name);
            }
            pending.arguments.push_str(&fragment.arguments);
        }

        if let Some(usage) = delta.usage {
            let total = self.usage.get_or_insert_with(ProviderUsage::default);
            total.input_tokens += usage.input_tokens;
            total.output_tokens += usage.output_tokens;
            total.reasoning_tokens += usage.reasoning_tokens;
            total.cached_tokens += usage.cached_tokens;
        }

        match delta.text.filter(|t| !t.is_empty()) {
            Some(text) => {
                self.message.content.push_str(&text);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> AiMessage {
        self.message.clone()
    }

    /// Completes the round.
    ///
    /// Returns the final message and the ids of tool calls whose arguments
    /// could not be parsed, mapped to the parse error.
    fn finish(self) -> (AiMessage, HashMap<String, String>) {
        let mut message = self.message;
        let mut invalid = HashMap::new();

        for (index, pending) in self.calls {
            let id = pending
                .id
                .unwrap_or_else(|| format!("call_{index}_{}", Uuid::now_v7().simple()));
            let args = match parse_arguments(&pending.arguments) {
                Ok(args) => args,
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        tool = %pending.name,
                        %error,
                        "model produced invalid tool arguments"
                    );
                    invalid.insert(id.clone(), format!("invalid arguments: {error}"));
                    Map::new()
                }
            };
            message
                .tool_calls
                .push(RequestedToolCall::new(id, pending.name, args));
        }

        if !self.reasoning.is_empty() {
            message.response_metadata.insert(
                "reasoning".into(),
                json!({
                    "content": self.reasoning,
                    "duration_ms": self.reasoning_elapsed.as_millis() as u64,
                }),
            );
        }

        if let Some(usage) = self.usage {
            message.usage_metadata = Some(json!({
                "input_tokens": usage.input_tokens,
                "output_tokens": usage.output_tokens,
                "reasoning_tokens": usage.reasoning_tokens,
                "cached_tokens": usage.cached_tokens,
            }));
        }

        (message, invalid)
    }
}

fn parse_arguments(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(error) => Err(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ScriptedProvider, ScriptedTurn};
    use crate::tool::{CalculatorTool, CurrentTimeTool};

    async fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(CurrentTimeTool).await;
        registry.register(CalculatorTool).await;
        Arc::new(registry)
    }

    fn agent(provider: &ScriptedProvider, tools: Arc<ToolRegistry>) -> ChatAgent {
        ChatAgent::new(
            Arc::new(provider.clone()),
            tools,
            AgentMode::Default,
            AgentConfig::default(),
        )
    }

    async fn collect(agent: &ChatAgent, input: &str) -> Vec<Result<AgentEvent>> {
        agent.stream(input, &[]).collect().await
    }

    #[tokio::test]
    async fn yields_growing_snapshots() -> anyhow::Result<()> {
        let provider = ScriptedProvider::new("gpt-4o", [ScriptedTurn::text(["你", "好", "！"])]);
        let events = collect(&agent(&provider, registry().await), "hi").await;

        let contents: Vec<String> = events
            .into_iter()
            .map(|event| match event {
                Ok(AgentEvent::Message(message)) => Ok(message.content().to_owned()),
                other => Err(anyhow::anyhow!("unexpected event: {other:?}")),
            })
            .collect::<anyhow::Result<_>>()?;
        assert_eq!(contents, ["你", "你好", "你好！", "你好！"]);
        Ok(())
    }

    #[tokio::test]
    async fn executes_tools_between_rounds() -> anyhow::Result<()> {
        let provider = ScriptedProvider::new(
            "gpt-4o",
            [
                ScriptedTurn::default().with_tool_call("call_1", "calculator", r#"{"expression":"6*7"}"#),
                ScriptedTurn::text(["答案是 42"]),
            ],
        );
        let events: Vec<AgentEvent> = collect(&agent(&provider, registry().await), "6*7?")
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        let tool = events
            .iter()
            .find_map(|event| match event {
                AgentEvent::Message(AgentMessage::Tool(message)) => Some(message),
                _ => None,
            })
            .ok_or_else(|| anyhow::anyhow!("no tool message"))?;
        assert_eq!(tool.tool_call_id, "call_1");
        assert_eq!(tool.content, "6*7 = 42");

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 2);
        let second = &requests[1].messages;
        assert!(matches!(&second[second.len() - 1], PromptMessage::Tool { tool_call_id, .. } if tool_call_id == "call_1"));
        assert!(matches!(&second[second.len() - 2], PromptMessage::Assistant { tool_calls, .. } if tool_calls.len() == 1));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_to_the_model() -> anyhow::Result<()> {
        let provider = ScriptedProvider::new(
            "gpt-4o",
            [
                ScriptedTurn::default().with_tool_call("call_1", "calculator", "{not json"),
                ScriptedTurn::text(["抱歉"]),
            ],
        );
        let events: Vec<AgentEvent> = collect(&agent(&provider, registry().await), "?")
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        let failed = events.iter().any(|event| {
            matches!(event, AgentEvent::Message(AgentMessage::Tool(message))
                if message.status == ToolStatus::Error && message.content.starts_with("invalid arguments"))
        });
        assert!(failed);
        Ok(())
    }

    #[tokio::test]
    async fn records_reasoning_and_usage() -> anyhow::Result<()> {
        let provider = ScriptedProvider::new(
            "gpt-4o",
            [ScriptedTurn::text(["好"]).with_reasoning("想一想").with_usage(12, 3)],
        );
        let events: Vec<AgentEvent> = collect(&agent(&provider, registry().await), "?")
            .await
            .into_iter()
            .collect::<Result<_>>()?;
        let Some(AgentEvent::Message(AgentMessage::Ai(last))) = events.last() else {
            anyhow::bail!("expected a final AI message");
        };
        assert_eq!(last.response_metadata["reasoning"]["content"], "想一想");
        let usage = last.usage_metadata.as_ref().ok_or_else(|| anyhow::anyhow!("no usage"))?;
        assert_eq!(usage["input_tokens"], 12);
        assert_eq!(usage["output_tokens"], 3);
        Ok(())
    }

    #[tokio::test]
    async fn enforces_iteration_limit() {
        let looping = || ScriptedTurn::default().with_tool_call("call", "get_current_time", "{}");
        let provider = ScriptedProvider::new("gpt-4o", [looping(), looping(), looping()]);
        let agent = ChatAgent::new(
            Arc::new(provider),
            registry().await,
            AgentMode::Default,
            AgentConfig::default().with_max_iterations(2),
        );

        let result = agent.invoke("loop", &[]).await;
        assert!(matches!(result, Err(Error::Agent(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_deadline() {
        let provider = ScriptedProvider::new(
            "gpt-4o",
            [ScriptedTurn::text(["a", "b", "c"]).with_delay(Duration::from_secs(2))],
        );
        let agent = ChatAgent::new(
            Arc::new(provider),
            registry().await,
            AgentMode::Default,
            AgentConfig::default().with_max_execution_time(Duration::from_secs(3)),
        );

        let result = agent.invoke("slow", &[]).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn invoke_concatenates_rounds() -> anyhow::Result<()> {
        let provider = ScriptedProvider::new(
            "gpt-4o",
            [
                ScriptedTurn::text(["让我算一下。"]).with_tool_call("c1", "calculator", r#"{"expression":"1+1"}"#),
                ScriptedTurn::text(["结果是 ", "2"]),
            ],
        );
        let text = agent(&provider, registry().await).invoke("1+1", &[]).await?;
        assert_eq!(text, "让我算一下。结果是 2");
        Ok(())
    }

    #[tokio::test]
    async fn prompt_includes_history() -> anyhow::Result<()> {
        let provider = ScriptedProvider::new("gpt-4o", [ScriptedTurn::text(["ok"])]);
        let history = [
            HistoryMessage::new(MessageRole::User, "我叫小明"),
            HistoryMessage::new(MessageRole::Assistant, "你好，小明"),
        ];
        agent(&provider, Arc::new(ToolRegistry::new()))
            .invoke("我叫什么？", &history)
            .await?;

        let requests = provider.requests().await;
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], PromptMessage::system(AgentMode::Default.system_prompt()));
        assert_eq!(messages[3], PromptMessage::user("我叫什么？"));
        assert!(requests[0].tools.is_empty());
        Ok(())
    }
}
