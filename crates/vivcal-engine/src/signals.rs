//! Shutdown on SIGINT / SIGTERM (Ctrl+C elsewhere).
//!
//! The listener flips a watch flag; anything holding a [`ShutdownHandle`]
//! can wait on it or trigger it programmatically, e.g. the console's `quit`.

use std::io;

use tokio::sync::watch;
use tracing::{debug, info};

/// Shared shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once shutdown was triggered, including before the call.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only fails if it was dropped.
        let _ = rx.wait_for(|down| *down).await;
    }

    /// Installs the signal handlers and triggers this handle on the first
    /// signal. Fails when a handler cannot be installed.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let handle = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
            handle.trigger();
            debug!("signal listener stopped");
        });
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> io::Result<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, shutting down");
                handle.trigger();
            }
        });
        Ok(())
    }
}
