//! Shutdown coordination: waits for SIGINT/SIGTERM, then drains the pipeline
//! in order — cancel the supervisor, let processing workers see their
//! channel close, enqueue one shutdown sentinel per persistence worker, wait
//! for all workers to finish, then close shared resources.

use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::messages::PersistRequest;

/// Block until SIGINT or SIGTERM arrives.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Fan out one [`PersistRequest::Shutdown`] sentinel per persistence worker,
/// per the "each worker sees a terminal event exactly once" contract —
/// closing the channel alone would only wake a single waiting `recv`.
pub async fn drain_persistence(tx: &mpsc::Sender<PersistRequest>, worker_count: usize) {
    for _ in 0..worker_count {
        let _ = tx.send(PersistRequest::Shutdown).await;
    }
}

pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
