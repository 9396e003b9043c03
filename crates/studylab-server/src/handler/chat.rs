//! Chat handlers.
//!
//! ## Streaming
//!
//! `POST /chat/stream` answers with Server-Sent Events, one `data:` frame per
//! [`StreamChunk`]. Clients cancel generation by closing the connection; the
//! relay task stops on the first failed send.
//!
//! [`StreamChunk`]: studylab_core::types::StreamChunk

use std::convert::Infallible;
use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::{HeaderName, header};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use futures::StreamExt;
use studylab_core::types::DEFAULT_MODE;
use studylab_rig::ChatService;
use tokio_stream::wrappers::ReceiverStream;

use crate::extract::{Json, ValidateJson};
use crate::handler::request::SendChatMessage;
use crate::handler::response::{ChatHealth, ChatModes, ChatResponse, ErrorResponse};
use crate::service::{ServiceConfig, ServiceState};

/// Tracing target for chat operations.
const TRACING_TARGET: &str = "studylab_server::handler::chat";

/// Capacity of the channel between the relay task and the SSE body.
const STREAM_BUFFER: usize = 32;

/// Runs a chat turn to completion.
#[tracing::instrument(
    skip_all,
    fields(
        mode = %request.mode,
        use_tools = request.use_tools,
    )
)]
async fn send_message(
    State(chat): State<ChatService>,
    ValidateJson(request): ValidateJson<SendChatMessage>,
) -> Json<ChatResponse> {
    tracing::debug!(target: TRACING_TARGET, "Sending chat message");

    let response = chat.chat(&request.into_request()).await;

    tracing::info!(
        target: TRACING_TARGET,
        success = response.success,
        tools = response.tools_used.len(),
        "Chat message answered",
    );

    Json(response)
}

fn send_message_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Send chat message")
        .description(
            "Runs one agent turn and returns the final answer. Provider failures are \
             reported in the body with `success: false`.",
        )
        .response::<200, Json<ChatResponse>>()
        .response::<400, Json<ErrorResponse>>()
}

/// Streams a chat turn as Server-Sent Events.
#[tracing::instrument(
    skip_all,
    fields(
        mode = %request.mode,
        use_tools = request.use_tools,
    )
)]
async fn stream_message(
    State(chat): State<ChatService>,
    ValidateJson(request): ValidateJson<SendChatMessage>,
) -> impl IntoResponse {
    tracing::debug!(target: TRACING_TARGET, "Streaming chat message");

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(STREAM_BUFFER);
    let mut chunks = chat.stream(&request.into_request());

    tokio::spawn(async move {
        let mut frames = 0usize;

        while let Some(chunk) = chunks.next().await {
            let event = match chunk.to_json() {
                Ok(json) => Event::default().data(json),
                Err(e) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        kind = chunk.kind(),
                        error = %e,
                        "Failed to serialize stream chunk"
                    );
                    continue;
                }
            };

            // A failed send means the client went away.
            if tx.send(Ok(event)).await.is_err() {
                tracing::info!(
                    target: TRACING_TARGET,
                    frames,
                    "Client disconnected, stopping chat stream"
                );
                return;
            }
            frames += 1;
        }

        tracing::debug!(target: TRACING_TARGET, frames, "Chat stream finished");
    });

    let headers = [
        (HeaderName::from_static("x-accel-buffering"), "no"),
        (header::CACHE_CONTROL, "no-cache"),
    ];

    (headers, Sse::new(ReceiverStream::new(rx)))
}

/// Reports the chat service health.
async fn chat_health(
    State(config): State<Arc<ServiceConfig>>,
    State(chat): State<ChatService>,
) -> Json<ChatHealth> {
    let health = chat.health();
    tracing::debug!(
        target: TRACING_TARGET,
        metrics = ?health.metrics,
        "Chat health requested"
    );

    Json(ChatHealth {
        status: health.status,
        service: "chat".to_owned(),
        version: config.app_version.clone(),
    })
}

fn chat_health_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Chat health")
        .description("Returns the health of the chat service.")
        .response::<200, Json<ChatHealth>>()
}

/// Lists the agent modes.
async fn chat_modes(State(chat): State<ChatService>) -> Json<ChatModes> {
    let modes = chat
        .modes()
        .into_iter()
        .map(|(mode, description)| (mode.to_string(), description.to_owned()))
        .collect();

    Json(ChatModes {
        modes,
        default: DEFAULT_MODE.to_owned(),
    })
}

fn chat_modes_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List agent modes")
        .description("Returns every agent mode with a one-line description.")
        .response::<200, Json<ChatModes>>()
}

/// Returns a [`Router`] with all chat routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/chat", post_with(send_message, send_message_docs))
        .api_route("/chat/health", get_with(chat_health, chat_health_docs))
        .api_route("/chat/modes", get_with(chat_modes, chat_modes_docs))
        // SSE endpoint - uses regular axum routing as aide doesn't support SSE in OpenAPI
        .route("/chat/stream", axum::routing::post(stream_message))
        .with_path_items(|item| item.tag("Chat"))
}
