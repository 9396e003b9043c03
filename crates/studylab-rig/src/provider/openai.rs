//! OpenAI-compatible chat completions client with streaming support.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CompletionDelta, CompletionProvider, CompletionRequest, CompletionStream, PromptMessage,
    ProviderConfig, ProviderUsage, SseStream, ToolCallDelta,
};
use crate::{Error, Result};

const PROVIDER: &str = "openai";
const DONE_MARKER: &str = "[DONE]";

/// Tracing target for provider traffic.
const TRACING_TARGET: &str = "studylab_rig::provider::openai";

/// Streaming client for `/chat/completions`.
#[derive(Clone)]
pub struct OpenAiProvider {
    http: Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    /// Creates a provider after validating the configuration.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_body(&self, request: CompletionRequest) -> ApiRequest {
        ApiRequest {
            model: self.config.model.clone(),
            messages: request.messages.into_iter().map(ApiMessage::from).collect(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: request.tools.into_iter().map(ApiTool::from).collect(),
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let body = self.build_body(request);
        tracing::debug!(
            target: TRACING_TARGET,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "starting completion round"
        );

        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(PROVIDER, format!("{status}: {body}")));
        }

        Ok(Box::pin(delta_stream(response)))
    }
}

fn delta_stream(
    response: reqwest::Response,
) -> impl futures::Stream<Item = Result<CompletionDelta>> + Send + 'static {
    let mut events = SseStream::new(response.bytes_stream());

    try_stream! {
        while let Some(event) = events.next().await {
            let event = event?;
            if event.data == DONE_MARKER {
                break;
            }

            let chunk: ApiChunk = serde_json::from_str(&event.data).map_err(|e| {
                Error::provider(PROVIDER, format!("malformed stream chunk: {e}"))
            })?;
            if let Some(ref error) = chunk.error {
                Err::<(), _>(Error::provider(PROVIDER, error.message.clone()))?;
            }
            yield chunk.into_delta();
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    stream: bool,
    stream_options: StreamOptions,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<PromptMessage> for ApiMessage {
    fn from(message: PromptMessage) -> Self {
        let (role, content, tool_calls, tool_call_id) = match message {
            PromptMessage::System { content } => ("system", content, Vec::new(), None),
            PromptMessage::User { content } => ("user", content, Vec::new(), None),
            PromptMessage::Assistant {
                content,
                tool_calls,
            } => {
                let calls = tool_calls
                    .into_iter()
                    .map(|call| ApiToolCall {
                        id: call.id,
                        kind: "function",
                        function: ApiFunctionCall {
                            name: call.name,
                            arguments: Value::Object(call.args).to_string(),
                        },
                    })
                    .collect();
                ("assistant", content, calls, None)
            }
            PromptMessage::Tool {
                tool_call_id,
                content,
            } => ("tool", content, Vec::new(), Some(tool_call_id)),
        };

        Self {
            role,
            content,
            tool_calls,
            tool_call_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolDefinition,
}

impl From<ToolDefinition> for ApiTool {
    fn from(definition: ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: definition,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChunk {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiError>,
}

impl ApiChunk {
    fn into_delta(self) -> CompletionDelta {
        let mut delta = CompletionDelta {
            usage: self.usage.map(ProviderUsage::from),
            ..Default::default()
        };

        for choice in self.choices.into_iter().filter(|choice| choice.index == 0) {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                delta.text = Some(content);
            }
            if let Some(reasoning) = choice.delta.reasoning_content.filter(|c| !c.is_empty()) {
                delta.reasoning = Some(reasoning);
            }
            delta.tool_calls = choice
                .delta
                .tool_calls
                .into_iter()
                .map(|call| ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name: call.function.as_ref().and_then(|f| f.name.clone()),
                    arguments: call
                        .function
                        .and_then(|f| f.arguments)
                        .unwrap_or_default(),
                })
                .collect();
            delta.finish_reason = choice.finish_reason;
        }

        delta
    }
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    delta: ApiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

impl From<ApiUsage> for ProviderUsage {
    fn from(usage: ApiUsage) -> Self {
        let reasoning_tokens = usage
            .completion_tokens_details
            .map(|d| d.reasoning_tokens)
            .unwrap_or_default();

        Self {
            input_tokens: usage.prompt_tokens,
            // OpenAI counts reasoning inside completion tokens.
            output_tokens: usage.completion_tokens.saturating_sub(reasoning_tokens),
            reasoning_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
