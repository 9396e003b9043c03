//! Agent modes and their system prompts.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Appended to the system prompt when tools are available.
const TOOL_GUIDANCE: &str = "\n\n你可以使用提供的工具获取实时信息或进行计算。\
需要当前时间、日期或精确计算结果时，请调用相应工具，不要凭空猜测。";

/// Prompt style selected per request.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    AsRefStr, Display, EnumString, EnumIter
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentMode {
    #[default]
    Default,
    Coding,
    Research,
    Concise,
    Detailed,
}

impl AgentMode {
    /// Parses a mode name, falling back to [`AgentMode::Default`].
    pub fn parse_or_default(name: &str) -> Self {
        name.trim().to_ascii_lowercase().parse().unwrap_or_default()
    }

    /// Returns the system prompt of this mode.
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Default => {
                "你是一个友好、专业的 AI 学习助手。\n\
                 请用清晰、准确的中文回答用户的问题。\n\
                 回答时保持条理清晰，必要时使用列表或分步骤说明。"
            }
            Self::Coding => {
                "你是一个经验丰富的编程助手，擅长解释代码和解决技术问题。\n\
                 回答时给出可运行的代码示例，并说明关键步骤。\n\
                 代码请使用 Markdown 代码块并标注语言。"
            }
            Self::Research => {
                "你是一个严谨的研究助手，擅长检索、整理和分析信息。\n\
                 回答时区分事实与推测，尽可能给出信息来源，并使用 [n] 标注引用。\n\
                 复杂问题请先列出计划，再逐步展开。"
            }
            Self::Concise => {
                "你是一个简洁高效的助手，只给出最关键的信息。\n\
                 回答尽量控制在三句话以内，避免不必要的铺垫。"
            }
            Self::Detailed => {
                "你是一个耐心细致的讲解者，会全面深入地解释问题。\n\
                 回答时覆盖背景、原理、示例和注意事项。\n\
                 适当使用标题和列表组织内容。"
            }
        }
    }

    /// Returns the system prompt, with tool guidance when tools are enabled.
    pub fn prompt_with_tools(self, has_tools: bool) -> String {
        let mut prompt = self.system_prompt().to_owned();
        if has_tools {
            prompt.push_str(TOOL_GUIDANCE);
        }
        prompt
    }

    /// Returns the first line of the system prompt.
    pub fn description(self) -> &'static str {
        self.system_prompt().lines().next().unwrap_or_default()
    }

    /// Lists every mode.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}
