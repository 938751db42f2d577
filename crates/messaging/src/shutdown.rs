//! Shutdown coordination between the HTTP server and consumer loops.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// A signal for coordinating shutdown across components.
///
/// Clones share the same state. Once triggered it stays triggered, so a
/// component that starts waiting late still observes it.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trips the signal.
    pub fn trigger(&self) {
        if !self.sender.send_replace(true) {
            info!("Shutdown triggered");
        }
    }

    /// Returns true once the signal has been tripped.
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes when the signal is tripped.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so this can only end by seeing `true`.
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }

    /// Waits for SIGINT or SIGTERM, then trips the signal.
    pub async fn trigger_on_os_signal(&self) {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
            _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
            _ = self.cancelled() => return,
        }

        self.trigger();
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
