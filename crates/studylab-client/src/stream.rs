//! Consumer side of the enhanced chat stream.
//!
//! The server answers `POST /chat/stream` with `data: <json>` lines. The
//! decoder splits the body on raw bytes, so lines and multi-byte characters
//! cut by network chunk boundaries are reassembled before parsing. Lines
//! without the `data: ` prefix are ignored and malformed payloads are logged
//! and skipped; one bad frame never ends the stream.

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header;
use studylab_core::types::{ChatRequest, StreamChunk};

use crate::client::ensure_success;
use crate::{ChatClient, Error, Result};

/// Tracing target for stream parsing.
pub const TRACING_TARGET: &str = "studylab_client::stream";

/// Prefix of lines carrying a chunk.
const DATA_PREFIX: &[u8] = b"data: ";

/// Stream of chunks decoded from one streaming response.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Incremental line decoder for the chunk stream.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    line: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw body bytes and returns every chunk completed by them.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                chunks.extend(parse_line(&line));
            } else {
                self.line.push(byte);
            }
        }
        chunks
    }

    /// Parses whatever is left after the body ended without a newline.
    pub fn finish(&mut self) -> Option<StreamChunk> {
        let line = std::mem::take(&mut self.line);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<StreamChunk> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let data = line.strip_prefix(DATA_PREFIX)?;
    let data = String::from_utf8_lossy(data);

    match StreamChunk::from_json(&data) {
        Ok(chunk) => Some(chunk),
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET,
                %error,
                line = %data,
                "Skipping malformed stream line"
            );
            None
        }
    }
}

impl ChatClient {
    /// Streams one chat turn.
    ///
    /// Transport failures, non-success responses and a body that closes
    /// before an `end` or `error` chunk surface as `Err` items and end the
    /// stream. A server-side failure arrives as an ordinary `error` chunk.
    pub fn chat_stream_enhanced(&self, request: &ChatRequest) -> ChunkStream {
        let client = self.clone();
        let mut request = request.clone();
        request.streaming = true;

        Box::pin(async_stream::try_stream! {
            tracing::debug!(
                target: TRACING_TARGET,
                mode = %request.mode,
                use_tools = request.use_tools,
                "Opening chat stream"
            );

            let response = client
                .http()
                .post(client.url("chat/stream")?)
                .header(header::ACCEPT, "text/event-stream")
                .json(&request)
                .send()
                .await?;
            let response = ensure_success(response).await?;

            let mut body = response.bytes_stream();
            let mut decoder = ChunkDecoder::new();
            let mut terminated = false;
            while let Some(bytes) = body.next().await {
                for chunk in decoder.decode(&bytes?) {
                    terminated |= chunk.is_terminal();
                    yield chunk;
                }
            }

            if let Some(chunk) = decoder.finish() {
                terminated |= chunk.is_terminal();
                yield chunk;
            }

            if !terminated {
                tracing::warn!(target: TRACING_TARGET, "Chat stream closed before the end chunk");
                Err::<(), Error>(Error::stream("stream ended before end"))?;
            }
        })
    }

    /// Streams one chat turn, restarting it when the transport fails.
    ///
    /// A restart replays the whole turn from the beginning, so chunks sent
    /// before the failure are received again. Up to
    /// [`ClientConfig::max_retries`] restarts are made, waiting
    /// `retry_delay * attempt` before each. Errors that a restart cannot fix,
    /// such as a rejected request body, are returned at once.
    ///
    /// [`ClientConfig::max_retries`]: crate::ClientConfig::max_retries
    pub fn chat_stream_with_retry(&self, request: &ChatRequest) -> ChunkStream {
        let client = self.clone();
        let request = request.clone();
        let max_retries = self.config().max_retries;
        let retry_delay = self.config().retry_delay;

        Box::pin(async_stream::stream! {
            let mut attempt = 0u32;
            loop {
                let mut chunks = client.chat_stream_enhanced(&request);
                let mut failure: Option<Error> = None;
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => yield Ok(chunk),
                        Err(error) => {
                            failure = Some(error);
                            break;
                        }
                    }
                }

                let Some(error) = failure else {
                    return;
                };

                if attempt >= max_retries || !error.is_retryable() {
                    tracing::error!(
                        target: TRACING_TARGET,
                        %error,
                        attempts = attempt + 1,
                        "Chat stream failed"
                    );
                    yield Err(error);
                    return;
                }

                attempt += 1;
                tracing::warn!(
                    target: TRACING_TARGET,
                    %error,
                    attempt,
                    max_retries,
                    "Chat stream failed, restarting"
                );
                tokio::time::sleep(retry_delay * attempt).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use bytes::Bytes;

    use super::*;
    use crate::ClientConfig;
    use crate::test::{serve, sse};

    const BODY: &str = concat!(
        "data: {\"type\":\"start\",\"message\":\"开始生成...\"}\n\n",
        "data: {\"type\":\"chunk\",\"content\":\"你好\"}\n\n",
        "data: {not json}\n\n",
        ": comment\n\n",
        "data: {\"type\":\"chunk\",\"content\":\"世界\"}\r\n\r\n",
        "data: {\"type\":\"end\",\"message\":\"生成完成\"}\n\n",
    );

    fn kinds(chunks: &[StreamChunk]) -> Vec<&'static str> {
        chunks.iter().map(StreamChunk::kind).collect()
    }

    #[test]
    fn decodes_across_every_split_point() {
        let bytes = BODY.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = ChunkDecoder::new();
            let mut chunks = decoder.decode(&bytes[..split]);
            chunks.extend(decoder.decode(&bytes[split..]));
            chunks.extend(decoder.finish());

            assert_eq!(
                kinds(&chunks),
                ["start", "chunk", "chunk", "end"],
                "split at {split}"
            );
        }
    }

    #[test]
    fn malformed_line_does_not_end_decoding() {
        let mut decoder = ChunkDecoder::new();
        let chunks = decoder.decode(b"data: {\"type\":\"bogus\"}\ndata: {\"type\":\"chunk\",\"content\":\"a\"}\n");
        assert_eq!(chunks, [StreamChunk::chunk("a")]);
    }

    #[test]
    fn trailing_line_without_newline() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.decode(b"data: {\"type\":\"end\",\"message\":\"x\"}").is_empty());
        assert_eq!(decoder.finish().map(|c| c.kind()), Some("end"));
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn stream_yields_chunks_in_order() -> anyhow::Result<()> {
        let router = Router::new().route("/chat/stream", post(|| async { sse(BODY) }));
        let client = ChatClient::new(ClientConfig::new(serve(router).await?))?;

        let chunks: Vec<_> = client
            .chat_stream_enhanced(&ChatRequest::new("你好"))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        assert_eq!(kinds(&chunks), ["start", "chunk", "chunk", "end"]);
        let content: String = chunks
            .iter()
            .filter_map(|chunk| match chunk {
                StreamChunk::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(content, "你好世界");
        Ok(())
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() -> anyhow::Result<()> {
        let body = concat!(
            "data: {\"type\":\"start\",\"message\":\"开始生成...\"}\n\n",
            "data: {\"type\":\"chunk\",\"content\":\"你好\"}\n\n",
        );
        let router = Router::new().route("/chat/stream", post(move || async move { sse(body) }));
        let client = ChatClient::new(ClientConfig::new(serve(router).await?))?;

        let items: Vec<_> = client
            .chat_stream_enhanced(&ChatRequest::new("你好"))
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert!(items[..2].iter().all(Result::is_ok));
        assert!(matches!(&items[2], Err(Error::Stream(_))));
        Ok(())
    }

    #[tokio::test]
    async fn error_chunk_ends_the_stream_cleanly() -> anyhow::Result<()> {
        let body = "data: {\"type\":\"error\",\"message\":\"抱歉\",\"error\":\"boom\"}\n\n";
        let router = Router::new().route("/chat/stream", post(move || async move { sse(body) }));
        let client = ChatClient::new(ClientConfig::new(serve(router).await?))?;

        let chunks: Vec<_> = client
            .chat_stream_enhanced(&ChatRequest::new("你好"))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;
        assert_eq!(kinds(&chunks), ["error"]);
        Ok(())
    }

    #[tokio::test]
    async fn retry_restarts_truncated_streams() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/chat/stream",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                        return sse(BODY);
                    }
                    sse("data: {\"type\":\"start\",\"message\":\"x\"}\n\n")
                }),
            )
            .with_state(calls.clone());
        let client = ChatClient::new(retry_config(serve(router).await?))?;

        let chunks: Vec<_> = client
            .chat_stream_with_retry(&ChatRequest::new("你好"))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(kinds(&chunks), ["start", "start", "chunk", "chunk", "end"]);
        Ok(())
    }

    #[tokio::test]
    async fn stream_reports_status_errors() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/chat/stream",
            post(|| async { (StatusCode::BAD_REQUEST, "bad request") }),
        );
        let client = ChatClient::new(ClientConfig::new(serve(router).await?))?;

        let items: Vec<_> = client
            .chat_stream_enhanced(&ChatRequest::new(""))
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Err(Error::Status { status, .. }) if *status == StatusCode::BAD_REQUEST
        ));
        Ok(())
    }

    /// Fails the first `failures` requests, then streams [`BODY`].
    async fn flaky(State((calls, failures)): State<(Arc<AtomicUsize>, usize)>) -> Response {
        if calls.fetch_add(1, Ordering::SeqCst) < failures {
            return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
        }
        sse(BODY)
    }

    fn retry_config(base_url: String) -> ClientConfig {
        ClientConfig::new(base_url)
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn retry_restarts_after_server_error() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/chat/stream", post(flaky))
            .with_state((calls.clone(), 2));
        let client = ChatClient::new(retry_config(serve(router).await?))?;

        let chunks: Vec<_> = client
            .chat_stream_with_retry(&ChatRequest::new("你好"))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(kinds(&chunks), ["start", "chunk", "chunk", "end"]);
        Ok(())
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/chat/stream", post(flaky))
            .with_state((calls.clone(), usize::MAX));
        let client = ChatClient::new(retry_config(serve(router).await?))?;

        let items: Vec<_> = client
            .chat_stream_with_retry(&ChatRequest::new("你好"))
            .collect()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        Ok(())
    }

    #[tokio::test]
    async fn retry_skips_client_errors() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/chat/stream",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    StatusCode::BAD_REQUEST
                }),
            )
            .with_state(calls.clone());
        let client = ChatClient::new(retry_config(serve(router).await?))?;

        let items: Vec<_> = client
            .chat_stream_with_retry(&ChatRequest::new(""))
            .collect()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(items[0].is_err());
        Ok(())
    }

    #[tokio::test]
    async fn retry_replays_the_whole_turn() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/chat/stream",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                        return sse(BODY);
                    }

                    // Start streaming, then drop the connection mid-body.
                    let frames = futures::stream::iter([
                        Ok::<_, std::io::Error>(Bytes::from_static(
                            b"data: {\"type\":\"start\",\"message\":\"x\"}\n\n",
                        )),
                        Err(std::io::Error::other("connection reset")),
                    ]);
                    sse(Body::from_stream(frames))
                }),
            )
            .with_state(calls.clone());
        let client = ChatClient::new(retry_config(serve(router).await?))?;

        let chunks: Vec<_> = client
            .chat_stream_with_retry(&ChatRequest::new("你好"))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(kinds(&chunks), ["start", "start", "chunk", "chunk", "end"]);
        Ok(())
    }
}
