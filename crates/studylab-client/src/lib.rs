#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod chat;
mod client;
mod config;
mod error;
mod manager;
mod stream;

pub use crate::chat::{ChatOptions, EnhancedChat, STREAM_ERROR_MESSAGE};
pub use crate::client::{ChatClient, HealthReport, TRACING_TARGET};
pub use crate::config::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
};
pub use crate::error::{Error, Result};
pub use crate::manager::{MessageManager, Subscription};
pub use crate::stream::{ChunkDecoder, ChunkStream};

#[cfg(test)]
mod test {
    use axum::Router;
    use axum::body::Body;
    use axum::response::{IntoResponse, Response};
    use bytes::Bytes;
    use studylab_core::types::StreamChunk;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn serve(router: Router) -> anyhow::Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(format!("http://{addr}"))
    }

    /// Wraps `body` in an event-stream response.
    pub fn sse(body: impl Into<Body>) -> Response {
        ([("content-type", "text/event-stream")], body.into()).into_response()
    }

    /// Encodes one chunk as a `data:` frame.
    pub fn frame(chunk: &StreamChunk) -> Bytes {
        Bytes::from(chunk.to_sse_frame().unwrap_or_default())
    }
}
