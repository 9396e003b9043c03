//! HTTP server startup.

use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::lifecycle::serve_with_shutdown;
use super::shutdown::{cancel_on, shutdown_signal};
use super::{ServerError, ServerResult, TRACING_TARGET_STARTUP};
use crate::config::ServerConfig;

/// Starts an HTTP server that shuts down gracefully on SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the address cannot be
/// bound, or the server fails while running.
///
/// # Examples
///
/// ```ignore
/// let app = axum::Router::new();
/// serve_http(app, ServerConfig::default()).await?;
/// ```
pub async fn serve_http(app: Router, server_config: ServerConfig) -> ServerResult<()> {
    if let Err(validation_error) = server_config.validate() {
        tracing::error!(
            target: TRACING_TARGET_STARTUP,
            error = %validation_error,
            "Invalid server configuration"
        );
        return Err(ServerError::invalid_config(&validation_error));
    }

    let server_addr = server_config.server_addr();
    let listener = TcpListener::bind(server_addr).await.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_STARTUP,
            addr = %server_addr,
            error = %err,
            "Failed to bind to address"
        );
        ServerError::bind_error(server_addr, err)
    })?;

    let shutdown = CancellationToken::new();
    cancel_on(shutdown_signal(), shutdown.clone());

    serve_listener(listener, app, &server_config, shutdown).await
}

/// Serves `app` on an already bound listener until `shutdown` is cancelled.
pub(crate) async fn serve_listener(
    listener: TcpListener,
    app: Router,
    server_config: &ServerConfig,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            target: TRACING_TARGET_STARTUP,
            %addr,
            "Server is ready and listening for connections"
        );
    }

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
    .into_future();

    serve_with_shutdown(server_config, shutdown, server).await
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    #[tokio::test]
    async fn serves_until_cancelled() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = Router::new().route("/health", get(|| async { "ok" }));

        let shutdown = CancellationToken::new();
        let config = ServerConfig::default();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { serve_listener(listener, app, &config, shutdown).await }
        });

        let mut stream = TcpStream::connect(addr).await?;
        stream
            .write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("ok"));

        shutdown.cancel();
        server.await??;
        Ok(())
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let config = ServerConfig {
            host: "127.0.0.1".parse()?,
            port: listener.local_addr()?.port(),
            ..ServerConfig::default()
        };

        let result = serve_http(Router::new(), config).await;
        assert!(matches!(result, Err(ServerError::BindError { .. })));
        Ok(())
    }
}
