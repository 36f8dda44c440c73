//! Local listener for push notifications.
//!
//! The upstream POSTs to the configured path whenever the watched calendar
//! changes. The body carries nothing we need; the request is acknowledged
//! right away and turned into an [`EngineCommand::Notified`].

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::EngineCommand;
use crate::error::{EngineError, EngineResult};

/// Builds the notification router. Every other path is a 404.
pub fn router(path: &str, commands: mpsc::Sender<EngineCommand>) -> Router {
    Router::new()
        .route(path, axum::routing::post(notification))
        .with_state(commands)
}

async fn notification(
    State(commands): State<mpsc::Sender<EngineCommand>>,
    headers: HeaderMap,
) -> StatusCode {
    let state = header(&headers, "x-goog-resource-state");
    let channel = header(&headers, "x-goog-channel-id");
    debug!(state = %state, channel = %channel, "push notification");

    if let Err(e) = commands.try_send(EngineCommand::Notified) {
        warn!(error = %e, "dropping push notification");
    }
    StatusCode::OK
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// A running webhook listener.
#[derive(Debug)]
pub struct WebhookServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WebhookServer {
    /// Binds `listen` and serves notifications on `path`.
    ///
    /// If the server later fails, the engine is told through
    /// [`EngineCommand::ListenerFailed`].
    pub async fn bind(
        listen: SocketAddr,
        path: &str,
        commands: mpsc::Sender<EngineCommand>,
    ) -> EngineResult<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|source| EngineError::Bind {
                addr: listen,
                source,
            })?;
        let addr = listener.local_addr()?;
        let app = router(path, commands.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "webhook listener failed");
                let _ = commands
                    .send(EngineCommand::ListenerFailed {
                        reason: format!("webhook listener failed: {}", e),
                    })
                    .await;
            }
        });

        info!(addr = %addr, path = %path, "webhook listener started");
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting requests and waits briefly for in-flight ones.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(Duration::from_secs(5), &mut self.task)
            .await
            .is_err()
        {
            warn!("webhook listener did not stop in time");
            self.task.abort();
        }
        info!(addr = %self.addr, "webhook listener stopped");
    }
}
