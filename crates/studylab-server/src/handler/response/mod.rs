//! Response types for HTTP handlers.

mod chat;
mod error_response;
mod monitors;

pub use chat::*;
pub use error_response::ErrorResponse;
pub use monitors::*;
pub use studylab_core::types::ChatResponse;
