//! Error types for studylab-client.

use std::fmt;

use reqwest::StatusCode;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server responded with {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reported a failure.
    #[error("stream error: {0}")]
    Stream(String),

    /// A message is already streaming.
    #[error("a message is already streaming")]
    Busy,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates a stream error.
    pub fn stream(message: impl fmt::Display) -> Self {
        Self::Stream(message.to_string())
    }

    /// Creates a configuration error.
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config(message.to_string())
    }

    /// Returns true if restarting the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Stream(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
