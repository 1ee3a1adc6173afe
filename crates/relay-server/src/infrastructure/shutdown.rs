//! Process signal handling.
//!
//! The relay stops on Ctrl+C (SIGINT) or, on Unix, SIGTERM.  Once a signal
//! arrives a watchdog is armed: if graceful shutdown has not finished within
//! the configured timeout the process exits with code 1, whatever it is
//! still waiting on.

use std::time::Duration;

use tracing::{error, info};

/// Waits for a termination signal.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}

/// Waits for a termination signal, then arms the force-exit watchdog.
///
/// Intended as the graceful-shutdown future of the HTTP server.
pub async fn shutdown_signal(timeout: Duration) {
    wait_for_signal().await;
    arm_watchdog(timeout);
}

/// Spawns a task that terminates the process with exit code 1 after
/// `timeout`.
pub fn arm_watchdog(timeout: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        error!(
            timeout_secs = timeout.as_secs(),
            "graceful shutdown timed out, forcing exit"
        );
        std::process::exit(1);
    });
}
