//! Utility modules for common functionality across the crate.

pub mod tracing_targets;

pub use tracing_targets::*;

/// Maximum accepted request body size in bytes.
///
/// Chat messages are capped at 32 000 characters; history brings the rest.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;
