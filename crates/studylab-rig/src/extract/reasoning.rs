use std::sync::LazyLock;

use regex::Regex;
use studylab_core::types::Reasoning;

use super::{Strategy, first_match};
use crate::agent::{AgentMessage, AiMessage};

static THINKING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<thinking>(.*?)</thinking>").ok());

/// Extracts the model's reasoning.
///
/// Prefers `response_metadata.reasoning {content, duration_ms}` and falls
/// back to the first `<thinking>` block of the content.
pub fn extract_reasoning(message: &AgentMessage) -> Option<Reasoning> {
    const STRATEGIES: [Strategy<Reasoning>; 2] = [from_metadata, from_thinking_tags];
    first_match(message, &STRATEGIES)
}

fn from_metadata(message: &AiMessage) -> Option<Reasoning> {
    let reasoning = message.response_metadata.get("reasoning")?.as_object()?;
    let content = reasoning.get("content")?.as_str()?;
    if content.is_empty() {
        return None;
    }

    let duration_ms = reasoning
        .get("duration_ms")
        .and_then(|d| d.as_f64())
        .unwrap_or_default();
    Some(Reasoning {
        content: content.to_owned(),
        duration: duration_ms / 1000.0,
    })
}

fn from_thinking_tags(message: &AiMessage) -> Option<Reasoning> {
    let captures = THINKING.as_ref()?.captures(&message.content)?;
    Some(Reasoning {
        content: captures.get(1)?.as_str().trim().to_owned(),
        duration: 0.0,
    })
}
