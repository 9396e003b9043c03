//! Conversation controller driving one streamed turn at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde_json::{Map, Value};
use studylab_core::types::{
    ChatRequest, DEFAULT_MODE, EnhancedMessage, HistoryMessage, METADATA_ERROR, StreamChunk,
};
use tokio_util::sync::CancellationToken;

use crate::{ChatClient, Error, MessageManager, Result};

/// Tracing target for conversation operations.
pub const TRACING_TARGET: &str = "studylab_client::chat";

/// Content shown in place of an answer whose stream failed.
pub const STREAM_ERROR_MESSAGE: &str = "抱歉，发生了错误，请稍后重试。";

/// Options sent with every message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    pub mode: String,
    pub use_tools: bool,
    pub use_advanced_tools: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE.to_owned(),
            use_tools: true,
            use_advanced_tools: false,
        }
    }
}

/// The turn currently streaming, tagged with its sequence number.
type ActiveTurn = Option<(u64, CancellationToken)>;

/// Streams assistant answers into a [`MessageManager`].
///
/// Only one message streams at a time. Clones share the conversation and
/// the streaming state.
#[derive(Clone)]
pub struct EnhancedChat {
    client: ChatClient,
    messages: MessageManager,
    options: ChatOptions,
    streaming: Arc<AtomicBool>,
    turns: Arc<AtomicU64>,
    active: Arc<Mutex<ActiveTurn>>,
}

impl std::fmt::Debug for EnhancedChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancedChat")
            .field("options", &self.options)
            .field("streaming", &self.is_streaming())
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}

impl EnhancedChat {
    pub fn new(client: ChatClient) -> Self {
        Self::with_options(client, ChatOptions::default())
    }

    pub fn with_options(client: ChatClient, options: ChatOptions) -> Self {
        Self {
            client,
            messages: MessageManager::new(),
            options,
            streaming: Arc::new(AtomicBool::new(false)),
            turns: Arc::new(AtomicU64::new(0)),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses `messages` as the conversation store, e.g. one restored from disk.
    pub fn with_messages(mut self, messages: MessageManager) -> Self {
        self.messages = messages;
        self
    }

    fn active(&self) -> MutexGuard<'_, ActiveTurn> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `text` and streams the answer into a new assistant message.
    ///
    /// Returns the assistant message id. A failed stream does not return an
    /// error: the assistant content is replaced with [`STREAM_ERROR_MESSAGE`]
    /// and the detail is stored under `metadata.error`. Calling this while a
    /// message is streaming fails with [`Error::Busy`].
    pub async fn send_message(&self, text: impl Into<String>) -> Result<String> {
        if self
            .streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }

        let turn = self.turns.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *self.active() = Some((turn, token.clone()));
        let _release = TurnRelease { chat: self, turn };

        let text = text.into();
        let history: Vec<HistoryMessage> = self
            .messages
            .get_all_messages()
            .into_iter()
            .filter(|message| !message.content.is_empty())
            .map(|message| HistoryMessage::new(message.role, message.content))
            .collect();

        let request = ChatRequest::new(text.clone())
            .with_history(history)
            .with_mode(self.options.mode.clone())
            .with_tools(self.options.use_tools)
            .with_advanced_tools(self.options.use_advanced_tools);

        self.messages.add_message(EnhancedMessage::user(text));
        let assistant = EnhancedMessage::assistant();
        let id = assistant.id.clone();
        self.messages.add_message(assistant);

        tracing::debug!(
            target: TRACING_TARGET,
            message_id = %id,
            turn,
            "Streaming assistant message"
        );

        if let Err(error) = self.drive(&id, &request, &token).await {
            tracing::warn!(
                target: TRACING_TARGET,
                message_id = %id,
                %error,
                "Assistant message failed"
            );
            self.messages.set_content(&id, STREAM_ERROR_MESSAGE);
            let mut metadata = Map::new();
            metadata.insert(METADATA_ERROR.to_owned(), Value::from(error.to_string()));
            self.messages.set_metadata(&id, metadata);
        }

        Ok(id)
    }

    async fn drive(&self, id: &str, request: &ChatRequest, token: &CancellationToken) -> Result<()> {
        let mut chunks = self.client.chat_stream_enhanced(request);

        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = chunks.next() => item,
            };

            let Some(item) = item else {
                return Ok(());
            };
            if token.is_cancelled() {
                return Ok(());
            }

            match item? {
                StreamChunk::Error { message, error } => {
                    return Err(Error::stream(error.unwrap_or(message)));
                }
                chunk => {
                    self.messages.apply_chunk(id, &chunk);
                }
            }
        }
    }

    /// Stops the streaming message, keeping the content received so far.
    pub fn stop_streaming(&self) {
        if let Some((turn, token)) = self.active().take() {
            tracing::debug!(target: TRACING_TARGET, turn, "Stopping stream");
            token.cancel();
        }
        self.streaming.store(false, Ordering::Release);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Clears the streaming state if `turn` is still the active one.
    fn release(&self, turn: u64) {
        // A stopped turn may already have been replaced by a newer one.
        let mut active = self.active();
        if matches!(&*active, Some((current, _)) if *current == turn) {
            *active = None;
            self.streaming.store(false, Ordering::Release);
        }
    }

    /// Returns the conversation ordered by timestamp.
    pub fn messages(&self) -> Vec<EnhancedMessage> {
        self.messages.get_all_messages()
    }

    /// Returns the underlying store, e.g. to subscribe to changes.
    pub fn manager(&self) -> &MessageManager {
        &self.messages
    }

    /// Removes every message.
    pub fn clear(&self) {
        self.messages.clear();
    }
}

/// Releases the streaming state when a turn finishes or its future is dropped.
struct TurnRelease<'a> {
    chat: &'a EnhancedChat,
    turn: u64,
}

impl Drop for TurnRelease<'_> {
    fn drop(&mut self) {
        self.chat.release(self.turn);
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::Response;
    use axum::routing::post;
    use bytes::Bytes;
    use studylab_core::types::{MessageRole, ToolState};

    use super::*;
    use crate::ClientConfig;
    use crate::test::{frame, serve, sse};

    async fn chat_for(router: Router) -> anyhow::Result<EnhancedChat> {
        let client = ChatClient::new(ClientConfig::new(serve(router).await?))?;
        Ok(EnhancedChat::new(client))
    }

    /// Streams "abc" at once and "d" after a pause.
    fn slow_body() -> Response {
        let frames = async_stream::stream! {
            yield Ok::<_, Infallible>(frame(&StreamChunk::start()));
            for part in ["a", "b", "c"] {
                yield Ok(frame(&StreamChunk::chunk(part)));
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            yield Ok(frame(&StreamChunk::chunk("d")));
            yield Ok(frame(&StreamChunk::end()));
        };
        sse(Body::from_stream(frames))
    }

    async fn wait_until(condition: impl Fn() -> bool) -> anyhow::Result<()> {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn streams_answer_into_store() -> anyhow::Result<()> {
        let body = [
            r#"{"type":"start","message":"开始生成..."}"#,
            r#"{"type":"tool","data":{"id":"call_1","name":"get_current_time","type":"tool-call-get_current_time","state":"input-available","parameters":{}}}"#,
            r#"{"type":"tool_result","data":{"id":"call_1","state":"output-available","result":"当前时间是：2025-01-01 12:00:00"}}"#,
            r#"{"type":"chunk","content":"现在是"}"#,
            r#"{"type":"chunk","content":"中午十二点"}"#,
            r#"{"type":"context","data":{"usedTokens":30,"maxTokens":128000,"usage":{"inputTokens":20,"outputTokens":10,"reasoningTokens":0},"modelId":"gpt-4o","percentage":0.0002}}"#,
            r#"{"type":"end","message":"生成完成"}"#,
        ]
        .map(|data| format!("data: {data}\n\n"))
        .concat();
        let router = Router::new().route("/chat/stream", post(move || async move { sse(body) }));
        let chat = chat_for(router).await?;

        let id = chat.send_message("现在几点？").await?;
        assert!(!chat.is_streaming());

        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].id, id);

        let answer = &messages[1];
        assert_eq!(answer.content, "现在是中午十二点");
        assert_eq!(answer.tools[0].state, ToolState::OutputAvailable);
        assert!(answer.context_usage.is_some());
        assert!(answer.error().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn error_chunk_replaces_content() -> anyhow::Result<()> {
        let body = [
            frame(&StreamChunk::start()),
            frame(&StreamChunk::chunk("部分")),
            frame(&StreamChunk::error("rate limited")),
        ]
        .concat();
        let router = Router::new().route(
            "/chat/stream",
            post(move || async move { sse(Bytes::from(body)) }),
        );
        let chat = chat_for(router).await?;

        let id = chat.send_message("你好").await?;
        let answer = chat.manager().get_message(&id).unwrap();
        assert_eq!(answer.content, STREAM_ERROR_MESSAGE);
        assert!(answer.error().is_some_and(|e| e.contains("rate limited")));
        assert!(!chat.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn truncated_stream_replaces_content() -> anyhow::Result<()> {
        let body = [frame(&StreamChunk::start()), frame(&StreamChunk::chunk("半句"))].concat();
        let router = Router::new().route(
            "/chat/stream",
            post(move || async move { sse(Bytes::from(body)) }),
        );
        let chat = chat_for(router).await?;

        let id = chat.send_message("你好").await?;
        let answer = chat.manager().get_message(&id).unwrap();
        assert_eq!(answer.content, STREAM_ERROR_MESSAGE);
        assert!(answer.error().is_some_and(|e| e.contains("stream ended before end")));
        assert!(!chat.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_send_releases_streaming() -> anyhow::Result<()> {
        let router = Router::new().route("/chat/stream", post(|| async { slow_body() }));
        let chat = chat_for(router).await?;

        let task = tokio::spawn({
            let chat = chat.clone();
            async move { chat.send_message("第一条").await }
        });
        let probe = chat.clone();
        wait_until(move || probe.messages().get(1).is_some_and(|m| m.content == "abc")).await?;
        assert!(chat.is_streaming());

        task.abort();
        let probe = chat.clone();
        wait_until(move || !probe.is_streaming()).await?;

        chat.send_message("第二条").await?;
        assert_eq!(chat.messages().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn http_failure_replaces_content() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/chat/stream",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let chat = chat_for(router).await?;

        let id = chat.send_message("你好").await?;
        let answer = chat.manager().get_message(&id).unwrap();
        assert_eq!(answer.content, STREAM_ERROR_MESSAGE);
        assert!(answer.error().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn stop_keeps_partial_content() -> anyhow::Result<()> {
        let router = Router::new().route("/chat/stream", post(|| async { slow_body() }));
        let chat = chat_for(router).await?;

        let task = tokio::spawn({
            let chat = chat.clone();
            async move { chat.send_message("你好").await }
        });

        let probe = chat.clone();
        wait_until(move || probe.messages().get(1).is_some_and(|m| m.content == "abc")).await?;

        let (count, subscription) = {
            let count = Arc::new(AtomicU64::new(0));
            let seen = count.clone();
            let subscription = chat.manager().subscribe(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
            (count, subscription)
        };

        chat.stop_streaming();
        assert!(!chat.is_streaming());

        let id = task.await??;
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(chat.manager().get_message(&id).map(|m| m.content), Some("abc".into()));
        drop(subscription);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_reentrant_send() -> anyhow::Result<()> {
        let router = Router::new().route("/chat/stream", post(|| async { slow_body() }));
        let chat = chat_for(router).await?;

        let task = tokio::spawn({
            let chat = chat.clone();
            async move { chat.send_message("第一条").await }
        });

        let probe = chat.clone();
        wait_until(move || probe.is_streaming()).await?;
        assert!(matches!(chat.send_message("第二条").await, Err(Error::Busy)));

        task.await??;
        assert!(!chat.is_streaming());
        assert_eq!(chat.messages().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn sends_history_and_options() -> anyhow::Result<()> {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let router = Router::new()
            .route(
                "/chat/stream",
                post(
                    |State(seen): State<Arc<Mutex<Vec<Value>>>>,
                     axum::Json(body): axum::Json<Value>| async move {
                        if let Ok(mut seen) = seen.lock() {
                            seen.push(body);
                        }
                        sse(Bytes::from(
                            [frame(&StreamChunk::chunk("好的")), frame(&StreamChunk::end())].concat(),
                        ))
                    },
                ),
            )
            .with_state(seen.clone());

        let client = ChatClient::new(ClientConfig::new(serve(router).await?))?;
        let options = ChatOptions {
            mode: "concise".to_owned(),
            use_tools: false,
            use_advanced_tools: false,
        };
        let chat = EnhancedChat::with_options(client, options);

        chat.send_message("第一条").await?;
        chat.send_message("第二条").await?;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1]["mode"], "concise");
        assert_eq!(seen[1]["use_tools"], false);
        assert_eq!(seen[1]["streaming"], true);
        assert_eq!(
            seen[1]["chat_history"],
            serde_json::json!([
                {"role": "user", "content": "第一条"},
                {"role": "assistant", "content": "好的"},
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn clear_empties_conversation() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/chat/stream",
            post(|| async { sse(Bytes::from(frame(&StreamChunk::end()))) }),
        );
        let chat = chat_for(router).await?;

        chat.send_message("你好").await?;
        chat.clear();
        assert!(chat.messages().is_empty());
        Ok(())
    }
}
