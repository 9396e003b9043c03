//! Data types shared by the chat server and its clients.
//!
//! # Overview
//!
//! - **StreamChunk**: one frame of the enhanced chat stream
//! - **ToolCall & ToolResult**: tool invocation lifecycle within a turn
//! - **ContextUsage**: token consumption against the model's context window
//! - **EnhancedMessage**: a chat message with all derived metadata reassembled
//! - **ChatRequest & ChatResponse**: HTTP bodies of the chat endpoints

mod api;
mod chunk;
mod enrichment;
mod message;
mod tool;
mod usage;

pub use api::{CHAT_ERROR_MESSAGE, ChatRequest, ChatResponse, DEFAULT_MODE, HistoryMessage};
pub use chunk::{END_MESSAGE, ERROR_MESSAGE, START_MESSAGE, StreamChunk};
pub use enrichment::{
    ChainOfThought, ChainOfThoughtStep, Citation, ItemStatus, Plan, PlanStep, QueueItem,
    Reasoning, Source, Task,
};
pub use message::{EnhancedMessage, METADATA_ERROR, METADATA_SUGGESTIONS, MessageRole};
pub use tool::{ToolCall, ToolResult, ToolState};
pub use usage::{ContextUsage, TokenUsage};
