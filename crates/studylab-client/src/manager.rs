//! Observable store of reassembled chat messages.
//!
//! [`MessageManager`] owns every [`EnhancedMessage`] of a conversation and
//! exposes one mutation per kind of stream payload. Each mutation of an
//! existing message notifies all subscribers synchronously with a snapshot
//! of the conversation. Mutations addressed to an unknown message id change
//! nothing and notify nobody.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use studylab_core::types::{
    ChainOfThought, Citation, ContextUsage, EnhancedMessage, METADATA_ERROR, METADATA_SUGGESTIONS,
    Plan, QueueItem, Reasoning, Source, StreamChunk, Task, ToolCall, ToolResult,
};

use crate::Result;

/// Tracing target for message store operations.
pub const TRACING_TARGET: &str = "studylab_client::manager";

type Listener = Arc<dyn Fn(&[EnhancedMessage]) + Send + Sync>;

#[derive(Default)]
struct ManagerInner {
    messages: RwLock<Vec<EnhancedMessage>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

impl ManagerInner {
    fn read(&self) -> RwLockReadGuard<'_, Vec<EnhancedMessage>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EnhancedMessage>> {
        self.messages.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Conversation store with change notifications.
///
/// This type is cheap to clone; clones share the same messages and
/// subscribers.
#[derive(Clone, Default)]
pub struct MessageManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for MessageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageManager")
            .field("messages", &self.inner.read().len())
            .field("listeners", &self.inner.listeners().len())
            .finish()
    }
}

/// Handle returned by [`MessageManager::subscribe`].
///
/// The listener stays registered until the handle is dropped or
/// [`unsubscribe`] is called.
///
/// [`unsubscribe`]: Subscription::unsubscribe
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Arc<ManagerInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.listeners().retain(|(id, _)| *id != self.id);
    }
}

impl MessageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener called after every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[EnhancedMessage]) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: self.inner.clone(),
        }
    }

    fn notify(&self) {
        // Listeners run without any lock held so they may call back into the store.
        let listeners: Vec<Listener> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            return;
        }

        let messages = self.get_all_messages();
        for listener in listeners {
            listener(&messages);
        }
    }

    /// Applies `f` to the message with `id` and returns whether it changed.
    ///
    /// Listeners are notified whenever the message exists, even if `f` left
    /// it unchanged.
    fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut EnhancedMessage) -> bool,
    {
        let changed = {
            let mut messages = self.inner.write();
            match messages.iter_mut().find(|message| message.id == id) {
                Some(message) => f(message),
                None => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        message_id = id,
                        "Ignoring update for unknown message"
                    );
                    return false;
                }
            }
        };

        self.notify();
        changed
    }

    /// Adds a message, replacing any message with the same id.
    pub fn add_message(&self, message: EnhancedMessage) {
        {
            let mut messages = self.inner.write();
            match messages.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message,
                None => messages.push(message),
            }
        }
        self.notify();
    }

    pub fn get_message(&self, id: &str) -> Option<EnhancedMessage> {
        self.inner.read().iter().find(|m| m.id == id).cloned()
    }

    /// Returns every message ordered by timestamp, then insertion.
    pub fn get_all_messages(&self) -> Vec<EnhancedMessage> {
        let mut messages = self.inner.read().clone();
        messages.sort_by_key(|message| message.timestamp);
        messages
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Appends streamed text to the message content.
    pub fn append_content(&self, id: &str, delta: &str) -> bool {
        self.update(id, |message| {
            message.content.push_str(delta);
            true
        })
    }

    pub fn set_content(&self, id: &str, content: impl Into<String>) -> bool {
        let content = content.into();
        self.update(id, |message| {
            message.content = content;
            true
        })
    }

    /// Registers a tool call, replacing a call with the same id.
    pub fn add_tool_call(&self, id: &str, call: ToolCall) -> bool {
        self.update(id, |message| {
            match message.tools.iter_mut().find(|tool| tool.id == call.id) {
                Some(existing) => *existing = call,
                None => message.tools.push(call),
            }
            true
        })
    }

    /// Completes a registered tool call.
    ///
    /// A result for an unknown call leaves the message unchanged and returns
    /// `false`; listeners are still notified.
    pub fn update_tool_result(&self, id: &str, result: &ToolResult) -> bool {
        self.update(id, |message| {
            let applied = message.tools.iter_mut().any(|tool| tool.apply(result));
            if !applied {
                tracing::debug!(
                    target: TRACING_TARGET,
                    message_id = %message.id,
                    tool_call_id = %result.id,
                    "Ignoring result for unknown tool call"
                );
            }
            applied
        })
    }

    pub fn set_reasoning(&self, id: &str, reasoning: Reasoning) -> bool {
        self.update(id, |message| {
            message.reasoning = Some(reasoning);
            true
        })
    }

    pub fn set_sources(&self, id: &str, sources: Vec<Source>) -> bool {
        self.update(id, |message| {
            message.sources = sources;
            true
        })
    }

    /// Adds a source unless the same link is already listed.
    ///
    /// Returns `false` for a duplicate link; listeners are still notified.
    pub fn add_source(&self, id: &str, source: Source) -> bool {
        self.update(id, |message| {
            if message.sources.iter().any(|s| s.href == source.href) {
                return false;
            }
            message.sources.push(source);
            true
        })
    }

    pub fn set_plan(&self, id: &str, plan: Plan) -> bool {
        self.update(id, |message| {
            message.plan = Some(plan);
            true
        })
    }

    /// Adds a task, replacing a task with the same id.
    pub fn add_task(&self, id: &str, task: Task) -> bool {
        self.update(id, |message| {
            match message.tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task,
                None => message.tasks.push(task),
            }
            true
        })
    }

    pub fn set_queue(&self, id: &str, queue: Vec<QueueItem>) -> bool {
        self.update(id, |message| {
            message.queue = queue;
            true
        })
    }

    pub fn set_context_usage(&self, id: &str, usage: ContextUsage) -> bool {
        self.update(id, |message| {
            message.context_usage = Some(usage);
            true
        })
    }

    pub fn add_citation(&self, id: &str, citation: Citation) -> bool {
        self.update(id, |message| {
            message.citations.push(citation);
            true
        })
    }

    pub fn set_chain_of_thought(&self, id: &str, chain: ChainOfThought) -> bool {
        self.update(id, |message| {
            message.chain_of_thought = Some(chain);
            true
        })
    }

    /// Merges `metadata` into the message metadata, overwriting equal keys.
    pub fn set_metadata(&self, id: &str, metadata: Map<String, Value>) -> bool {
        self.update(id, |message| {
            message.metadata.extend(metadata);
            true
        })
    }

    /// Folds one stream chunk into the message.
    ///
    /// `start` and `end` carry nothing to store. An `error` chunk records its
    /// detail under `metadata.error`.
    pub fn apply_chunk(&self, id: &str, chunk: &StreamChunk) -> bool {
        match chunk {
            StreamChunk::Start { .. } | StreamChunk::End { .. } => false,
            StreamChunk::Chunk { content } => self.append_content(id, content),
            StreamChunk::Tool { data } => self.add_tool_call(id, data.clone()),
            StreamChunk::ToolResult { data } => self.update_tool_result(id, data),
            StreamChunk::Reasoning { data } => self.set_reasoning(id, data.clone()),
            StreamChunk::Source { data } => self.add_source(id, data.clone()),
            StreamChunk::Sources { data } => self.set_sources(id, data.clone()),
            StreamChunk::Plan { data } => self.set_plan(id, data.clone()),
            StreamChunk::Task { data } => self.add_task(id, data.clone()),
            StreamChunk::Queue { data } => self.set_queue(id, data.clone()),
            StreamChunk::Context { data } => self.set_context_usage(id, data.clone()),
            StreamChunk::Citation { data } => self.add_citation(id, data.clone()),
            StreamChunk::ChainOfThought { data } => self.set_chain_of_thought(id, data.clone()),
            StreamChunk::Suggestions { data } => {
                let mut metadata = Map::new();
                metadata.insert(METADATA_SUGGESTIONS.to_owned(), Value::from(data.clone()));
                self.set_metadata(id, metadata)
            }
            StreamChunk::Error { message, error } => {
                let detail = error.clone().unwrap_or_else(|| message.clone());
                let mut metadata = Map::new();
                metadata.insert(METADATA_ERROR.to_owned(), Value::from(detail));
                self.set_metadata(id, metadata)
            }
        }
    }

    /// Removes every message.
    pub fn clear(&self) {
        self.inner.write().clear();
        self.notify();
    }

    /// Serializes the conversation as a JSON array ordered like
    /// [`get_all_messages`](Self::get_all_messages).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.get_all_messages())?)
    }

    /// Replaces the conversation with the messages in `json`.
    ///
    /// On a parse failure the store is left unchanged.
    pub fn from_json(&self, json: &str) -> Result<()> {
        let messages: Vec<EnhancedMessage> = serde_json::from_str(json)?;
        *self.inner.write() = messages;
        self.notify();
        Ok(())
    }

    /// Writes the conversation to `path`.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tokio::fs::write(path, self.to_json()?).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            path = %path.display(),
            messages = self.len(),
            "Conversation saved"
        );
        Ok(())
    }

    /// Restores the conversation from `path`.
    ///
    /// Returns `false` and leaves the store untouched when the file does not
    /// exist.
    pub async fn load_from(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        self.from_json(&json)?;

        tracing::debug!(
            target: TRACING_TARGET,
            path = %path.display(),
            messages = self.len(),
            "Conversation restored"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use jiff::{Timestamp, ToSpan};
    use serde_json::json;
    use studylab_core::types::{MessageRole, ToolState};

    use super::*;

    fn manager_with(id: &str) -> MessageManager {
        let manager = MessageManager::new();
        manager.add_message(EnhancedMessage::with_id(id, MessageRole::Assistant, ""));
        manager
    }

    fn counter(manager: &MessageManager) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let subscription = manager.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, subscription)
    }

    #[test]
    fn appends_content_and_notifies() {
        let manager = manager_with("a1");
        let (count, _subscription) = counter(&manager);

        assert!(manager.append_content("a1", "你好"));
        assert!(manager.append_content("a1", "，世界"));

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(manager.get_message("a1").map(|m| m.content), Some("你好，世界".into()));
    }

    #[test]
    fn unknown_id_is_a_silent_no_op() {
        let manager = manager_with("a1");
        let (count, _subscription) = counter(&manager);

        assert!(!manager.append_content("missing", "x"));
        assert!(!manager.set_plan(
            "missing",
            Plan {
                title: "执行计划".into(),
                description: String::new(),
                steps: Vec::new(),
            }
        ));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_stops_notifications() {
        let manager = manager_with("a1");
        let (count, subscription) = counter(&manager);

        manager.append_content("a1", "x");
        subscription.unsubscribe();
        manager.append_content("a1", "y");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_receives_snapshot() {
        let manager = manager_with("a1");
        let last = Arc::new(Mutex::new(String::new()));
        let seen = last.clone();
        let _subscription = manager.subscribe(move |messages| {
            if let Some(message) = messages.first()
                && let Ok(mut last) = seen.lock()
            {
                *last = message.content.clone();
            }
        });

        manager.append_content("a1", "snapshot");
        assert_eq!(*last.lock().unwrap(), "snapshot");
    }

    #[test]
    fn no_op_mutations_still_notify() {
        let manager = manager_with("a1");
        let source = Source {
            href: "https://a".into(),
            title: "A".into(),
        };
        let (count, _subscription) = counter(&manager);

        assert!(manager.add_source("a1", source.clone()));
        assert!(!manager.add_source("a1", source));
        assert!(!manager.update_tool_result("a1", &ToolResult::output("call_9", "x")));

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(manager.get_message("a1").map(|m| m.sources.len()), Some(1));
    }

    #[test]
    fn tool_lifecycle() {
        let manager = manager_with("a1");
        let call = ToolCall::new("call_1", "get_current_time", Map::new());

        assert!(manager.add_tool_call("a1", call.clone()));
        assert!(manager.add_tool_call("a1", call));
        assert!(manager.update_tool_result("a1", &ToolResult::output("call_1", "12:00")));
        assert!(!manager.update_tool_result("a1", &ToolResult::output("call_9", "x")));

        let message = manager.get_message("a1").unwrap();
        assert_eq!(message.tools.len(), 1);
        assert_eq!(message.tools[0].state, ToolState::OutputAvailable);
        assert_eq!(message.tools[0].result, Some(json!("12:00")));
    }

    #[test]
    fn applies_stream_chunks() -> anyhow::Result<()> {
        let manager = manager_with("a1");
        let chunks = [
            StreamChunk::start(),
            StreamChunk::chunk("部分"),
            StreamChunk::from_json(r#"{"type":"suggestions","data":["继续","总结"]}"#)?,
            StreamChunk::from_json(r#"{"type":"task","data":{"id":"task-1","title":"读书","completed":false}}"#)?,
            StreamChunk::from_json(r#"{"type":"task","data":{"id":"task-1","title":"读书","completed":true}}"#)?,
            StreamChunk::from_json(r#"{"type":"source","data":{"href":"https://a","title":"A"}}"#)?,
            StreamChunk::from_json(r#"{"type":"source","data":{"href":"https://a","title":"A"}}"#)?,
            StreamChunk::end(),
        ];
        for chunk in &chunks {
            manager.apply_chunk("a1", chunk);
        }

        let message = manager.get_message("a1").unwrap();
        assert_eq!(message.content, "部分");
        assert_eq!(message.suggestions(), ["继续", "总结"]);
        assert_eq!(message.tasks.len(), 1);
        assert!(message.tasks[0].completed);
        assert_eq!(message.sources.len(), 1);
        Ok(())
    }

    #[test]
    fn error_chunk_records_detail() {
        let manager = manager_with("a1");
        assert!(manager.apply_chunk("a1", &StreamChunk::error("rate limited")));
        assert_eq!(
            manager.get_message("a1").and_then(|m| m.error().map(str::to_owned)),
            Some("rate limited".into())
        );
    }

    #[test]
    fn metadata_is_merged() {
        let manager = manager_with("a1");
        manager.set_metadata("a1", Map::from_iter([("a".to_owned(), json!(1))]));
        manager.set_metadata("a1", Map::from_iter([("b".to_owned(), json!(2))]));

        let metadata = manager.get_message("a1").unwrap().metadata;
        assert_eq!(metadata.get("a"), Some(&json!(1)));
        assert_eq!(metadata.get("b"), Some(&json!(2)));
    }

    #[test]
    fn messages_are_sorted_by_timestamp() -> anyhow::Result<()> {
        let manager = MessageManager::new();
        let now = Timestamp::now();

        let mut later = EnhancedMessage::with_id("later", MessageRole::Assistant, "");
        later.timestamp = now.checked_add(1.second())?;
        let mut earlier = EnhancedMessage::with_id("earlier", MessageRole::User, "");
        earlier.timestamp = now;

        manager.add_message(later);
        manager.add_message(earlier);

        let ids: Vec<_> = manager.get_all_messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["earlier", "later"]);
        Ok(())
    }

    #[test]
    fn json_round_trip_replaces_contents() -> anyhow::Result<()> {
        let manager = manager_with("a1");
        manager.append_content("a1", "保存");
        let json = manager.to_json()?;

        let restored = MessageManager::new();
        restored.add_message(EnhancedMessage::with_id("old", MessageRole::User, ""));
        restored.from_json(&json)?;

        assert!(restored.get_message("old").is_none());
        assert_eq!(restored.get_message("a1").map(|m| m.content), Some("保存".into()));
        assert!(restored.from_json("not json").is_err());
        assert_eq!(restored.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn persists_to_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("messages.json");

        let manager = manager_with("a1");
        manager.append_content("a1", "持久化");
        manager.save_to(&path).await?;

        let restored = MessageManager::new();
        assert!(restored.load_from(&path).await?);
        assert_eq!(restored.get_all_messages(), manager.get_all_messages());

        let empty = MessageManager::new();
        assert!(!empty.load_from(dir.path().join("missing.json")).await?);
        assert!(empty.is_empty());
        Ok(())
    }
}
