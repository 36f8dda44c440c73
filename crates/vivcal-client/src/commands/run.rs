//! `vivcal run`: the engine in the foreground with a stdin console.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tracing::{error, info, warn};
use vivcal_engine::{Engine, EngineError, ShutdownHandle};
use vivcal_providers::CalendarUpstream;
use vivcal_providers::google::GoogleCalendar;

use crate::config::ClientConfig;
use crate::console;
use crate::error::ClientResult;

/// How long teardown (unsubscribe, listener stop) may take.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;

    let google = config.google.to_provider_config()?;
    let upstream: Arc<dyn CalendarUpstream> = Arc::new(GoogleCalendar::new(&google)?);

    let mut engine = Engine::new(config.engine_config(), upstream);
    match config.webhook.tunnel()? {
        Some(tunnel) => engine = engine.with_tunnel(tunnel),
        None => info!("no public URL configured, push notifications disabled"),
    }

    let handle = engine.handle();
    let printer = tokio::spawn(console::print_events(handle.subscribe()));

    let shutdown = ShutdownHandle::new();
    shutdown.listen_for_signals()?;

    let mut engine_task = tokio::spawn(engine.run());
    let console_task = tokio::spawn(console::read_commands(
        BufReader::new(tokio::io::stdin()),
        handle.clone(),
        shutdown.clone(),
    ));

    let result = tokio::select! {
        _ = shutdown.wait() => {
            if let Err(e) = handle.shutdown().await
                && !matches!(e, EngineError::ShutDown)
            {
                warn!(error = %e, "failed to request engine shutdown");
            }
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut engine_task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("engine did not stop in time");
                    engine_task.abort();
                    Ok(Ok(()))
                }
            }
        }
        joined = &mut engine_task => joined,
    };

    console_task.abort();
    printer.abort();

    match result {
        Ok(outcome) => outcome.map_err(Into::into),
        Err(e) => {
            error!(error = %e, "engine task panicked");
            Err(EngineError::ShutDown.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    fn with_credentials() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.google.client_id = Some("id".to_string());
        config.google.client_secret = Some("secret".to_string());
        config
    }

    #[tokio::test]
    async fn zero_poll_interval_rejected_before_start() {
        let mut config = with_credentials();
        config.sync.poll_interval_secs = 0;

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(err.to_string().contains("sync.poll_interval_secs"));
    }

    #[tokio::test]
    async fn zero_max_results_rejected_before_start() {
        let mut config = with_credentials();
        config.sync.max_results = 0;

        let err = run(&config).await.unwrap_err();
        assert!(err.to_string().contains("sync.max_results"));
    }
}
