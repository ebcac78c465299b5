//! SIGTERM/SIGINT handling.
//!
//! Both signals request a graceful shutdown: the socket stops accepting,
//! every mediator finishes its transfer in flight and unregisters.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Spawns the listener task. Call once at startup.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
            }
            let _ = shutdown_tx.send(true);
            debug!("Signal listener stopped");
        });
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, initiating shutdown");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// Completes once shutdown has been requested.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // A dropped sender also counts as shutdown.
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_shutdown() {
        let handler = SignalHandler::new();
        assert!(!handler.is_shutdown());
        handler.trigger_shutdown();
        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_signal_wakes_waiters() {
        let handler = SignalHandler::new();
        let shutdown = handler.shutdown();
        let handle = handler.shutdown_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("shutdown should complete");
        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn already_requested_shutdown_returns_at_once() {
        let handler = SignalHandler::new();
        let handle = handler.shutdown_handle();
        handle.trigger();
        assert!(handle.is_shutdown());

        tokio::time::timeout(Duration::from_millis(100), handle.wait().wait())
            .await
            .expect("shutdown already requested");
    }
}
