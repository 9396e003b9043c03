//! Request extractors with descriptive rejections.
//!
//! - [`Json`] - JSON deserialization whose failures render as the server's
//!   error body
//! - [`ValidateJson`] - [`Json`] followed by `validator` rules

pub mod reject;

pub use crate::extract::reject::{Json, ValidateJson};
