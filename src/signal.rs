//! Signal handling for graceful shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::logging::LOG_TARGET;

/// Wait for SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(err), _) | (_, Err(err)) => {
                warn!(target: LOG_TARGET, event = "signal_handler_unavailable", error = %err);
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = sigint.recv() => {
            info!(target: LOG_TARGET, event = "signal_received", signal = "SIGINT");
        }
        _ = sigterm.recv() => {
            info!(target: LOG_TARGET, event = "signal_received", signal = "SIGTERM");
        }
    }
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: LOG_TARGET, event = "signal_received", signal = "ctrl_c"),
        Err(err) => {
            warn!(target: LOG_TARGET, event = "signal_handler_unavailable", error = %err);
            std::future::pending::<()>().await
        }
    }
}

/// Cancel `token` when a shutdown signal arrives.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}
