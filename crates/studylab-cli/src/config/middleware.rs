//! Middleware configuration for the HTTP server.
//!
//! Groups the CORS, OpenAPI and recovery settings exported by
//! `studylab-server` so they parse from the same command line.
//!
//! # Example
//!
//! ```bash
//! studylab --cors-origins "https://studylab.example" --request-timeout 60
//! ```

use clap::Args;
use serde::{Deserialize, Serialize};
use studylab_server::middleware::{
    CorsConfig, OpenApiConfig, RecoveryConfig, SecurityHeadersConfig,
};

use crate::TRACING_TARGET_CONFIG;

/// Middleware configuration combining CORS, OpenAPI, and recovery settings.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Cross-origin settings. No origins configured means any origin.
    #[clap(flatten)]
    pub cors: CorsConfig,

    /// Paths of the OpenAPI document and the Scalar UI.
    #[clap(flatten)]
    pub openapi: OpenApiConfig,

    /// Request timeout and panic recovery.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,

    /// Response security headers.
    #[clap(skip)]
    pub headers: SecurityHeadersConfig,
}

impl MiddlewareConfig {
    /// Logs middleware configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            origins = ?self.cors.allowed_origins,
            credentials = self.cors.allow_credentials,
            "CORS configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            openapi_path = %self.openapi.open_api_json,
            scalar_path = %self.openapi.scalar_ui,
            "OpenAPI configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            request_timeout_secs = self.recovery.request_timeout,
            "Recovery configuration"
        );
    }
}
