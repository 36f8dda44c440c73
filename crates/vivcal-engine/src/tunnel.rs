//! Public reachability for the local webhook.
//!
//! The upstream needs an `https` address to POST notifications to. A
//! [`Tunnel`] provides one and reports when it stops working.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};
use vivcal_providers::BoxFuture;

use crate::error::{EngineError, EngineResult};

static TUNNEL_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://[^\s]+").expect("Invalid tunnel URL regex"));

/// An open tunnel.
pub struct TunnelSession {
    /// Base URL the upstream can reach the webhook listener through.
    pub public_url: String,
    /// Resolves with a reason once the tunnel is gone.
    pub closed: BoxFuture<'static, String>,
}

impl std::fmt::Debug for TunnelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelSession")
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

/// Exposes the local webhook listener publicly.
pub trait Tunnel: Send + Sync {
    fn open(&self) -> BoxFuture<'_, EngineResult<TunnelSession>>;
}

/// A fixed public URL, e.g. a reverse proxy in front of the listener.
#[derive(Debug, Clone)]
pub struct StaticTunnel {
    url: String,
}

impl StaticTunnel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Tunnel for StaticTunnel {
    fn open(&self) -> BoxFuture<'_, EngineResult<TunnelSession>> {
        let session = TunnelSession {
            public_url: self.url.clone(),
            closed: Box::pin(std::future::pending::<String>()),
        };
        Box::pin(async move { Ok(session) })
    }
}

/// Runs an external tunnel client such as `lt --port 8085`.
///
/// The first `https://` URL the process prints is the public address. The
/// session closes when the process exits; dropping the session kills it.
#[derive(Debug, Clone)]
pub struct CommandTunnel {
    program: String,
    args: Vec<String>,
    startup_timeout: Duration,
}

impl CommandTunnel {
    /// Parses a whitespace separated command line.
    pub fn new(command_line: &str) -> EngineResult<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| EngineError::config("tunnel command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            startup_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    async fn start(&self) -> EngineResult<TunnelSession> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::tunnel(format!("failed to start {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::tunnel("tunnel process has no stdout"))?;
        let mut lines = BufReader::new(stdout).lines();

        let public_url = tokio::time::timeout(self.startup_timeout, async {
            while let Some(line) = lines.next_line().await? {
                debug!(line = %line, "tunnel output");
                if let Some(m) = TUNNEL_URL_REGEX.find(&line) {
                    return Ok(Some(m.as_str().to_string()));
                }
            }
            Ok::<_, std::io::Error>(None)
        })
        .await
        .map_err(|_| EngineError::tunnel("timed out waiting for the tunnel URL"))??
        .ok_or_else(|| EngineError::tunnel("tunnel process exited before printing a URL"))?;

        info!(program = %self.program, url = %public_url, "tunnel opened");

        let closed = Box::pin(async move {
            // Keep draining so the process never blocks on a full pipe.
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "tunnel output");
            }
            match child.wait().await {
                Ok(status) => format!("tunnel process exited ({})", status),
                Err(e) => format!("tunnel process lost: {}", e),
            }
        });

        Ok(TunnelSession { public_url, closed })
    }
}

impl Tunnel for CommandTunnel {
    fn open(&self) -> BoxFuture<'_, EngineResult<TunnelSession>> {
        Box::pin(self.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_line() {
        let tunnel = CommandTunnel::new("lt --port 8085").unwrap();
        assert_eq!(tunnel.program, "lt");
        assert_eq!(tunnel.args, vec!["--port", "8085"]);
        assert!(CommandTunnel::new("   ").is_err());
    }

    #[test]
    fn url_pattern() {
        let line = "your url is: https://brave-fox-42.loca.lt";
        assert_eq!(
            TUNNEL_URL_REGEX.find(line).map(|m| m.as_str()),
            Some("https://brave-fox-42.loca.lt")
        );
    }

    #[tokio::test]
    async fn static_tunnel_stays_open() {
        let session = StaticTunnel::new("https://hooks.example.com")
            .open()
            .await
            .unwrap();
        assert_eq!(session.public_url, "https://hooks.example.com");
        let closed = tokio::time::timeout(Duration::from_millis(20), session.closed).await;
        assert!(closed.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_tunnel_reads_url_and_reports_exit() {
        let tunnel = CommandTunnel {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo 'your url is: https://test.loca.lt'; sleep 0.1".into(),
            ],
            startup_timeout: Duration::from_secs(5),
        };

        let session = tunnel.open().await.unwrap();
        assert_eq!(session.public_url, "https://test.loca.lt");
        let reason = tokio::time::timeout(Duration::from_secs(5), session.closed)
            .await
            .unwrap();
        assert!(reason.contains("exited"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_without_url_fails() {
        let tunnel = CommandTunnel {
            program: "sh".into(),
            args: vec!["-c".into(), "echo starting".into()],
            startup_timeout: Duration::from_secs(5),
        };
        let err = tunnel.open().await.unwrap_err();
        assert!(err.to_string().contains("before printing a URL"));
    }
}
