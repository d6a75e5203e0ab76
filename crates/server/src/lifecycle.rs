//! Process lifecycle: what stops the server.
//!
//! The server runs until a shutdown signal arrives or the order subscription
//! task ends on its own (stream closed, stream error, panic). The second case
//! stops the process too, with a non-zero exit status.

use std::future::Future;

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::consumer::ConsumerError;

/// Why [`wait_for_stop`] returned.
#[derive(Debug)]
pub enum StopReason<T> {
    /// Ctrl+C or SIGTERM. The subscription task is still running.
    Signal,
    /// The subscription task finished first. Its handle must not be awaited
    /// again.
    ConsumerExited(Result<T, JoinError>),
}

/// Wait until the shutdown signal fires or the subscription task ends.
pub async fn wait_for_stop<T>(
    consumer: &mut JoinHandle<T>,
    signal: impl Future<Output = ()>,
) -> StopReason<T> {
    tokio::select! {
        () = signal => StopReason::Signal,
        result = consumer => StopReason::ConsumerExited(result),
    }
}

/// Log how the subscription task ended.
pub fn log_consumer_exit(result: &Result<Result<(), ConsumerError>, JoinError>, expected: bool) {
    match result {
        Ok(Ok(())) if expected => info!("Order subscription stopped"),
        Ok(Ok(())) => error!("Order subscription ended unexpectedly, ingestion has stopped"),
        Ok(Err(e)) => error!(error = %e, "Order subscription failed, ingestion has stopped"),
        Err(e) => error!(error = %e, "Order subscription task panicked"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
