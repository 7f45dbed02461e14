//! Signal handling for graceful shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Waits for a shutdown signal (SIGINT or SIGTERM on Unix).
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!(signal = "SIGINT", "shutdown signal received");
        }
        _ = sigterm.recv() => {
            info!(signal = "SIGTERM", "shutdown signal received");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "shutdown signal received");
    Ok(())
}

/// Spawns a task that cancels the token on the first shutdown signal.
pub fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => shutdown.cancel(),
            Err(error) => warn!(%error, "cannot listen for shutdown signals"),
        }
    });
}
