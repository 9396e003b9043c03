//! Centralized tracing target constants for structured logging.
//!
//! Handlers declare their own `TRACING_TARGET`; the targets here are shared by
//! middleware and the service layer.

/// Request metrics and performance monitoring.
pub const TRACING_TARGET_METRICS: &str = "studylab_server::metrics";

/// Error recovery including middleware errors and request failures.
pub const TRACING_TARGET_RECOVERY_ERROR: &str = "studylab_server::recovery::error";

/// Panic recovery including handler panics and service failures.
pub const TRACING_TARGET_RECOVERY_PANIC: &str = "studylab_server::recovery::panic";

/// Request validation failures.
pub const TRACING_TARGET_VALIDATION: &str = "studylab_server::validation";

/// Application state construction.
pub const TRACING_TARGET_SERVICE: &str = "studylab_server::service";
