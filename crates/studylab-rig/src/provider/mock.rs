//! Scripted completion provider for tests.
//!
//! Each call to [`CompletionProvider::stream`] replays the next
//! [`ScriptedTurn`]. Running out of turns is reported as a provider error.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    CompletionDelta, CompletionProvider, CompletionRequest, CompletionStream, ProviderUsage,
    ToolCallDelta,
};
use crate::{Error, Result};

/// One scripted completion round.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    deltas: Vec<CompletionDelta>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedTurn {
    /// A round streaming the given text pieces.
    pub fn text<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: pieces.into_iter().map(CompletionDelta::text).collect(),
            ..Default::default()
        }
    }

    /// A round that fails before producing anything.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Appends a tool call, with its arguments split in two fragments.
    pub fn with_tool_call(mut self, id: &str, name: &str, arguments: &str) -> Self {
        let index = self
            .deltas
            .iter()
            .flat_map(|d| d.tool_calls.iter().map(|c| c.index + 1))
            .max()
            .unwrap_or_default();
        let split = arguments
            .char_indices()
            .nth(arguments.chars().count() / 2)
            .map(|(at, _)| at)
            .unwrap_or(arguments.len());
        let (head, tail) = arguments.split_at(split);

        self.deltas.push(CompletionDelta {
            tool_calls: vec![ToolCallDelta {
                index,
                id: Some(id.to_owned()),
                name: Some(name.to_owned()),
                arguments: head.to_owned(),
            }],
            ..Default::default()
        });
        self.deltas.push(CompletionDelta {
            tool_calls: vec![ToolCallDelta {
                index,
                arguments: tail.to_owned(),
                ..Default::default()
            }],
            ..Default::default()
        });
        self
    }

    /// Appends a reasoning fragment.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.deltas.push(CompletionDelta {
            reasoning: Some(reasoning.into()),
            ..Default::default()
        });
        self
    }

    /// Appends a usage report.
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.deltas.push(CompletionDelta {
            usage: Some(ProviderUsage {
                input_tokens,
                output_tokens,
                ..Default::default()
            }),
            ..Default::default()
        });
        self
    }

    /// Fails the round after the deltas scripted so far.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleeps before each delta.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Provider replaying [`ScriptedTurn`]s in order.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    model_id: String,
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(model_id: impl Into<String>, turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            model_id: model_id.into(),
            turns: Arc::new(Mutex::new(turns.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues more rounds.
    pub async fn push(&self, turn: ScriptedTurn) {
        self.turns.lock().await.push_back(turn);
    }

    /// Returns every request received so far.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        self.requests.lock().await.push(request);

        let Some(turn) = self.turns.lock().await.pop_front() else {
            return Err(Error::provider("scripted", "no scripted turn left"));
        };
        if turn.deltas.is_empty()
            && let Some(message) = turn.failure
        {
            return Err(Error::provider("scripted", message));
        }

        let stream = stream! {
            let finish = if turn.deltas.iter().any(|d| !d.tool_calls.is_empty()) {
                "tool_calls"
            } else {
                "stop"
            };

            for delta in turn.deltas {
                if let Some(delay) = turn.delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(delta);
            }

            match turn.failure {
                Some(message) => yield Err(Error::provider("scripted", message)),
                None => yield Ok(CompletionDelta {
                    finish_reason: Some(finish.to_owned()),
                    ..Default::default()
                }),
            }
        };

        Ok(Box::pin(stream))
    }
}
