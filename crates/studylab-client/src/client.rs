//! HTTP client for the chat API.

use std::sync::Arc;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use studylab_core::ServiceStatus;
use studylab_core::types::{ChatRequest, ChatResponse};
use url::Url;

use crate::{ClientConfig, Error, Result};

/// Tracing target for client operations.
pub const TRACING_TARGET: &str = "studylab_client::client";

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub version: String,
    #[serde(default)]
    pub debug: bool,
}

struct ChatClientInner {
    http: Client,
    base_url: Url,
    config: ClientConfig,
}

/// Client for the LC-StudyLab chat server.
///
/// This type is cheap to clone and can be shared across tasks.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ChatClientInner>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Creates a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = config.base_url()?;

        tracing::debug!(
            target: TRACING_TARGET,
            base_url = %base_url,
            "Creating chat client"
        );

        let http = Client::builder()
            .user_agent(config.effective_user_agent())
            .build()?;

        Ok(Self {
            inner: Arc::new(ChatClientInner {
                http,
                base_url,
                config,
            }),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| Error::config(format!("invalid path {path}: {e}")))
    }

    pub(crate) fn http(&self) -> &Client {
        &self.inner.http
    }

    /// Sends one message and waits for the full answer.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(
            target: TRACING_TARGET,
            mode = %request.mode,
            use_tools = request.use_tools,
            "Sending chat message"
        );

        let response = self
            .http()
            .post(self.url("chat")?)
            .timeout(self.inner.config.effective_timeout())
            .json(request)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Checks that the server is up.
    pub async fn health(&self) -> Result<HealthReport> {
        let response = self
            .http()
            .get(self.url("health")?)
            .timeout(self.inner.config.effective_timeout())
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

/// Turns a non-success response into [`Error::Status`], keeping the
/// server's error message when the body carries one.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    tracing::warn!(
        target: TRACING_TARGET,
        status = %status,
        message = %message,
        "Request failed"
    );

    Err(Error::Status { status, message })
}
