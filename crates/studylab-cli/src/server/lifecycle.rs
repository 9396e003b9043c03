//! Server lifecycle management.
//!
//! Runs the server future until it finishes on its own or until the
//! shutdown window that opens with the shutdown token has elapsed.

use std::future::Future;
use std::io;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::{ServerError, ServerResult, TRACING_TARGET_SHUTDOWN, TRACING_TARGET_STARTUP};
use crate::config::ServerConfig;

/// Serves with lifecycle logging and a bounded graceful shutdown.
///
/// # Errors
///
/// Returns [`ServerError::Runtime`] when the server future fails.
pub async fn serve_with_shutdown<F>(
    server_config: &ServerConfig,
    shutdown: CancellationToken,
    serve: F,
) -> ServerResult<()>
where
    F: Future<Output = io::Result<()>>,
{
    let start_time = Instant::now();
    log_security_warnings(server_config);

    let timeout = server_config.shutdown_timeout();
    let deadline = async {
        shutdown.cancelled().await;
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            timeout_secs = timeout.as_secs(),
            "Graceful shutdown initiated"
        );
        tokio::time::sleep(timeout).await;
    };

    let result = tokio::select! {
        result = serve => result.map_err(ServerError::Runtime),
        () = deadline => {
            tracing::warn!(
                target: TRACING_TARGET_SHUTDOWN,
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout elapsed, dropping open connections"
            );
            Ok(())
        }
    };

    handle_result(result, start_time)
}

fn log_security_warnings(config: &ServerConfig) {
    if config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_STARTUP,
            host = %config.host,
            "Server bound to all interfaces, ensure firewall is configured"
        );
    }
}

fn handle_result(result: ServerResult<()>, start_time: Instant) -> ServerResult<()> {
    let uptime = start_time.elapsed();

    match result {
        Ok(()) => {
            tracing::info!(
                target: TRACING_TARGET_SHUTDOWN,
                uptime_secs = uptime.as_secs(),
                "Shutdown completed"
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!(
                target: TRACING_TARGET_SHUTDOWN,
                error = %err,
                context = ?err.context(),
                uptime_secs = uptime.as_secs(),
                "Fatal error"
            );

            if let Some(suggestion) = err.suggestion() {
                tracing::info!(
                    target: TRACING_TARGET_SHUTDOWN,
                    suggestion,
                    "Recovery suggestion"
                );
            }

            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn finished_server_is_success() {
        let config = ServerConfig::default();
        let result = serve_with_shutdown(&config, CancellationToken::new(), async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn server_failure_is_runtime_error() {
        let config = ServerConfig::default();
        let result = serve_with_shutdown(&config, CancellationToken::new(), async {
            Err(io::Error::other("test error"))
        })
        .await;

        assert!(matches!(result, Err(ServerError::Runtime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_server_is_cut_after_timeout() {
        let config = ServerConfig {
            shutdown_timeout: 5,
            ..ServerConfig::default()
        };
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let started = tokio::time::Instant::now();
        let result = serve_with_shutdown(&config, shutdown, std::future::pending()).await;

        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
