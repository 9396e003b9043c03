//! Extractors that replace axum's rejections with [`Error`] responses.
//!
//! [`Error`]: crate::handler::Error

pub mod enhanced_json;
pub mod validated_json;

pub use self::enhanced_json::Json;
pub use self::validated_json::ValidateJson;
