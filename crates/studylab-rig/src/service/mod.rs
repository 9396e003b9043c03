//! High-level chat service.
//!
//! [`ChatService`] is the entry point used by the HTTP layer: it picks the
//! tools for a request, builds a [`ChatAgent`] and either runs the turn to
//! completion or relays it as enhanced stream chunks.

mod config;

use std::sync::Arc;

pub use config::ChatConfig;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use studylab_core::ServiceHealth;
use studylab_core::types::{ChatRequest, ChatResponse, StreamChunk};

use crate::Result;
use crate::agent::{AgentConfig, AgentMode, ChatAgent};
use crate::provider::{CompletionProvider, OpenAiProvider};
use crate::relay::StreamRelay;
use crate::tool::{
    CalculatorTool, CurrentDateTool, CurrentTimeTool, SimpleWebSearchTool, ToolRegistry,
    WeatherForecastTool, WeatherTool, WebSearchTool,
};

/// Tracing target for the chat service.
const TRACING_TARGET: &str = "studylab_rig::service";

/// Stream of chunks for one turn, starting with `start`.
pub type ChunkStream = BoxStream<'static, StreamChunk>;

/// Inner state for [`ChatService`].
struct ChatServiceInner {
    provider: Arc<dyn CompletionProvider>,
    agent: AgentConfig,
    no_tools: Arc<ToolRegistry>,
    basic_tools: Arc<ToolRegistry>,
    /// Basic tools plus the web search and weather tools whose keys are
    /// configured.
    advanced_tools: Option<Arc<ToolRegistry>>,
}

/// Chat entry point.
///
/// This type is cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ChatServiceInner>,
}

impl ChatService {
    /// Creates a service backed by the OpenAI-compatible provider.
    pub async fn from_config(config: &ChatConfig) -> Result<Self> {
        config.validate()?;
        let provider = OpenAiProvider::new(config.provider.clone())?;
        Self::new(Arc::new(provider), config).await
    }

    /// Creates a service backed by any provider.
    pub async fn new(provider: Arc<dyn CompletionProvider>, config: &ChatConfig) -> Result<Self> {
        let mut basic = ToolRegistry::new();
        basic.register(CurrentTimeTool).await;
        basic.register(CurrentDateTool).await;
        basic.register(CalculatorTool).await;

        let mut advanced = basic.clone();
        match (
            WebSearchTool::new(config.search.clone()),
            SimpleWebSearchTool::new(config.search.clone()),
        ) {
            (Ok(search), Ok(quick)) => {
                advanced.register(search).await;
                advanced.register(quick).await;
            }
            (Err(error), _) | (_, Err(error)) => {
                tracing::info!(target: TRACING_TARGET, %error, "web search disabled");
            }
        }
        match (
            WeatherTool::new(config.weather.clone()),
            WeatherForecastTool::new(config.weather.clone()),
        ) {
            (Ok(weather), Ok(forecast)) => {
                advanced.register(weather).await;
                advanced.register(forecast).await;
            }
            (Err(error), _) | (_, Err(error)) => {
                tracing::info!(target: TRACING_TARGET, %error, "weather disabled");
            }
        }

        let advanced_tools = (advanced.len() > basic.len()).then(|| Arc::new(advanced));

        tracing::info!(
            target: TRACING_TARGET,
            model = %provider.model_id(),
            basic_tools = basic.len(),
            advanced_tools = ?advanced_tools.as_ref().map(|tools| tools.names()),
            "chat service ready"
        );

        Ok(Self {
            inner: Arc::new(ChatServiceInner {
                provider,
                agent: config.agent.clone(),
                no_tools: Arc::new(ToolRegistry::new()),
                basic_tools: Arc::new(basic),
                advanced_tools,
            }),
        })
    }

    /// Returns the model used for every turn.
    pub fn model_id(&self) -> &str {
        self.inner.provider.model_id()
    }

    /// Returns whether advanced tools can be offered.
    pub fn has_advanced_tools(&self) -> bool {
        self.inner.advanced_tools.is_some()
    }

    /// Returns whether an advanced tool is available.
    pub fn has_tool(&self, name: &str) -> bool {
        self.inner
            .advanced_tools
            .as_ref()
            .is_some_and(|tools| tools.has_tool(name))
    }

    /// Lists every mode with its description.
    pub fn modes(&self) -> Vec<(AgentMode, &'static str)> {
        AgentMode::all().map(|mode| (mode, mode.description())).collect()
    }

    /// Runs a turn to completion.
    ///
    /// Failures are reported in the response rather than as errors.
    #[tracing::instrument(skip_all, fields(mode = %request.mode, use_tools = request.use_tools))]
    pub async fn chat(&self, request: &ChatRequest) -> ChatResponse {
        let agent = self.agent(request);
        let tools_used = agent.tool_names();

        match agent.invoke(&request.message, request.history()).await {
            Ok(message) => {
                tracing::info!(target: TRACING_TARGET, chars = message.chars().count(), "chat completed");
                ChatResponse::success(message, &request.mode).with_tools_used(tools_used)
            }
            Err(error) => {
                tracing::error!(target: TRACING_TARGET, %error, "chat failed");
                ChatResponse::failure(&request.mode, error.to_string())
            }
        }
    }

    /// Streams a turn as enhanced chunks.
    ///
    /// The stream always starts with `start` and ends with either `end` or
    /// a single `error` chunk.
    pub fn stream(&self, request: &ChatRequest) -> ChunkStream {
        let agent = self.agent(request);
        let events = agent.stream(&request.message, request.history());
        let relay = StreamRelay::new(self.model_id(), request.use_tools);

        tracing::info!(
            target: TRACING_TARGET,
            mode = %agent.mode(),
            use_tools = request.use_tools,
            "streaming chat"
        );

        futures::stream::once(async { StreamChunk::start() })
            .chain(relay.relay(events))
            .boxed()
    }

    /// Reports the service health.
    pub fn health(&self) -> ServiceHealth {
        ServiceHealth::healthy()
            .with_metric("model", Value::from(self.model_id()))
            .with_metric("web_search", Value::from(self.has_tool("web_search")))
            .with_metric("weather", Value::from(self.has_tool("get_weather")))
    }

    fn agent(&self, request: &ChatRequest) -> ChatAgent {
        let mode = AgentMode::parse_or_default(&request.mode);
        ChatAgent::new(
            Arc::clone(&self.inner.provider),
            self.tools(request),
            mode,
            self.inner.agent.clone(),
        )
    }

    fn tools(&self, request: &ChatRequest) -> Arc<ToolRegistry> {
        if !request.use_tools {
            return Arc::clone(&self.inner.no_tools);
        }
        if !request.use_advanced_tools {
            return Arc::clone(&self.inner.basic_tools);
        }

        match &self.inner.advanced_tools {
            Some(tools) => Arc::clone(tools),
            None => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    "advanced tools requested without TAVILY_API_KEY or AMAP_KEY, using basic tools"
                );
                Arc::clone(&self.inner.basic_tools)
            }
        }
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("model", &self.model_id())
            .field("advanced_tools", &self.has_advanced_tools())
            .finish()
    }
}
