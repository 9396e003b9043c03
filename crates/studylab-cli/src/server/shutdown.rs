//! OS signals that stop the server.

use std::fmt;
use std::future::{Future, pending};
use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::TRACING_TARGET_SHUTDOWN;

/// Signal that asked the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT, usually Ctrl+C in a terminal.
    Interrupt,
    /// SIGTERM, sent by process supervisors and container runtimes.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Resolves with the first of SIGINT or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal still works.
pub async fn shutdown_signal() -> ShutdownSignal {
    let interrupt = async {
        installed(ShutdownSignal::Interrupt, tokio::signal::ctrl_c().await).await;
        ShutdownSignal::Interrupt
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => installed(ShutdownSignal::Terminate, Err(error)).await,
        }
        ShutdownSignal::Terminate
    };

    #[cfg(not(unix))]
    let terminate = pending::<ShutdownSignal>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}

/// Parks forever when installing the handler for `signal` failed.
async fn installed(signal: ShutdownSignal, result: io::Result<()>) {
    if let Err(error) = result {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            %signal,
            %error,
            "Cannot listen for shutdown signal"
        );
        pending::<()>().await;
    }
}

/// Cancels `shutdown` once `wait` resolves.
///
/// The listener also ends quietly when `shutdown` is cancelled elsewhere.
pub fn cancel_on<F>(wait: F, shutdown: CancellationToken) -> JoinHandle<()>
where
    F: Future<Output = ShutdownSignal> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            signal = wait => {
                tracing::info!(
                    target: TRACING_TARGET_SHUTDOWN,
                    %signal,
                    "Shutdown requested, draining open connections"
                );
                shutdown.cancel();
            }
            () = shutdown.cancelled() => {}
        }
    })
}
