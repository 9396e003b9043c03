use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use studylab_core::types::{ChainOfThought, ChainOfThoughtStep, Plan, PlanStep, QueueItem, Task};

use super::{Strategy, first_match};
use crate::agent::{AgentMessage, AiMessage};

static PLAN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)##?\s*(?:Plan|计划|步骤)\s*\n((?:\d+\.\s*.+\n?)+)").ok()
});
static PLAN_STEP: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^(\d+)\.\s*(.+)").ok());
static TASK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)-\s*\[([ xX])\]\s*(.+)").ok());
static STEP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<step(?:\s+id="([^"]+)")?>(.+?)</step>"#).ok()
});

/// Parses a `## Plan` (or `计划`, `步骤`) heading followed by numbered steps.
pub fn extract_plan(message: &AgentMessage) -> Option<Plan> {
    first_match::<Plan>(message, &[plan_from_heading])
}

fn plan_from_heading(message: &AiMessage) -> Option<Plan> {
    let block = PLAN.as_ref()?.captures(&message.content)?.get(1)?;
    let step = PLAN_STEP.as_ref()?;

    let steps: Vec<PlanStep> = block
        .as_str()
        .lines()
        .filter_map(|line| {
            let captures = step.captures(line.trim())?;
            Some(PlanStep {
                id: format!("step-{}", captures.get(1)?.as_str()),
                title: captures.get(2)?.as_str().trim().to_owned(),
                status: "pending".to_owned(),
            })
        })
        .collect();

    if steps.is_empty() {
        return None;
    }
    Some(Plan {
        title: "执行计划".to_owned(),
        description: format!("共 {} 个步骤", steps.len()),
        steps,
    })
}

/// Parses Markdown checklist items (`- [ ] todo`, `- [x] done`).
pub fn extract_tasks(message: &AgentMessage) -> Vec<Task> {
    let (AgentMessage::Ai(message), Some(pattern)) = (message, TASK.as_ref()) else {
        return Vec::new();
    };

    pattern
        .captures_iter(&message.content)
        .enumerate()
        .filter_map(|(i, captures)| {
            Some(Task {
                id: format!("task-{}", i + 1),
                title: captures.get(2)?.as_str().trim().to_owned(),
                completed: captures.get(1)?.as_str().eq_ignore_ascii_case("x"),
            })
        })
        .collect()
}

/// Extracts step-by-step reasoning.
///
/// Prefers `response_metadata.chain_of_thought.steps` and falls back to
/// `<step>` blocks in the content.
pub fn extract_chain_of_thought(message: &AgentMessage) -> Option<ChainOfThought> {
    const STRATEGIES: [Strategy<ChainOfThought>; 2] = [steps_from_metadata, steps_from_tags];
    first_match(message, &STRATEGIES)
}

fn steps_from_metadata(message: &AiMessage) -> Option<ChainOfThought> {
    let chain = message.response_metadata.get("chain_of_thought")?;
    let steps = chain
        .get("steps")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(i, step)| metadata_step(i + 1, step))
        .collect();
    Some(ChainOfThought { steps })
}

fn metadata_step(k: usize, step: &Map<String, Value>) -> ChainOfThoughtStep {
    let text = |key: &str| step.get(key).and_then(Value::as_str).map(str::to_owned);
    let extra = step
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "label" | "description" | "status"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    ChainOfThoughtStep {
        id: text("id").unwrap_or_else(|| format!("step-{k}")),
        label: text("label").unwrap_or_else(|| format!("Step {k}")),
        description: text("description").unwrap_or_default(),
        status: text("status").unwrap_or_else(|| "complete".to_owned()),
        extra,
    }
}

fn steps_from_tags(message: &AiMessage) -> Option<ChainOfThought> {
    let steps: Vec<ChainOfThoughtStep> = STEP
        .as_ref()?
        .captures_iter(&message.content)
        .enumerate()
        .filter_map(|(i, captures)| {
            let k = i + 1;
            Some(ChainOfThoughtStep {
                id: captures
                    .get(1)
                    .map(|id| id.as_str().to_owned())
                    .unwrap_or_else(|| format!("step-{k}")),
                label: format!("Step {k}"),
                description: captures.get(2)?.as_str().trim().to_owned(),
                status: "complete".to_owned(),
                extra: Map::new(),
            })
        })
        .collect();

    (!steps.is_empty()).then_some(ChainOfThought { steps })
}

/// Reads queued work from the context.
///
/// `queue` entries are used as given; `pending_tasks` entries get
/// `task-<idx>`, `Unknown Task` and `pending` defaults.
pub fn extract_queue(context: &Map<String, Value>) -> Vec<QueueItem> {
    if let Some(queue) = context.get("queue").and_then(Value::as_array) {
        return queue
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect();
    }

    context
        .get("pending_tasks")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(idx, task)| {
            let text = |key: &str| task.get(key).and_then(Value::as_str).map(str::to_owned);
            QueueItem {
                id: text("id").unwrap_or_else(|| format!("task-{idx}")),
                title: text("title").unwrap_or_else(|| "Unknown Task".to_owned()),
                status: text("status").unwrap_or_else(|| "pending".to_owned()),
            }
        })
        .collect()
}
