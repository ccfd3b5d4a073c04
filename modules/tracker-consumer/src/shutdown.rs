//! Signal-driven shutdown.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `cancel` on SIGINT or SIGTERM.
pub async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = wait_for("SIGINT", tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = wait_for("SIGTERM", async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        sigterm.recv().await;
        Ok::<(), io::Error>(())
    });
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Caught SIGINT, terminating"),
        _ = terminate => info!("Caught SIGTERM, terminating"),
    }
    cancel.cancel();
}

/// Resolve when `signal` fires. A handler that cannot be installed is logged
/// and never resolves, so it cannot trigger shutdown.
pub async fn wait_for<F>(name: &str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(signal = name, error = %e, "Failed to install signal handler");
        std::future::pending::<()>().await;
    }
}
