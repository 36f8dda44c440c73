//! Client configuration.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/vivcal/config.toml`. Every section and key is optional.
//!
//! ```toml
//! [google]
//! credentials_file = "~/.config/vivcal/credentials.json"
//! calendar_id = "primary"
//!
//! [webhook]
//! listen = "127.0.0.1:8085"
//! tunnel_command = "lt --port 8085"
//!
//! [sync]
//! poll_interval_secs = 60
//!
//! [log]
//! level = "debug"
//! format = "compact"
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vivcal_core::TracingOutputFormat;
use vivcal_engine::{
    ChannelConfig, CommandTunnel, EngineConfig, FetchConfig, StaticTunnel, Tunnel,
};

use crate::error::{ClientError, ClientResult};

/// Configuration for the vivcal client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub google: GoogleSettings,
    pub webhook: WebhookSettings,
    pub sync: SyncSettings,
    pub reminders: ReminderSettings,
    pub log: LogSettings,
}

/// Google Calendar provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Client credentials JSON downloaded from the Cloud Console. Takes
    /// precedence over `client_id` / `client_secret`.
    pub credentials_file: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// OAuth token file; defaults to `<config dir>/vivcal/token.json`.
    pub token_path: Option<PathBuf>,
    pub calendar_id: String,
    pub timeout_secs: u64,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            credentials_file: None,
            client_id: None,
            client_secret: None,
            token_path: None,
            calendar_id: "primary".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Inbound notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub listen: SocketAddr,
    pub path: String,
    /// Already public URL forwarding to `listen`.
    pub public_url: Option<String>,
    /// Command that exposes `listen` publicly and prints the URL, e.g.
    /// `lt --port 8085`.
    pub tunnel_command: Option<String>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 8085)),
            path: "/calendar-webhook".to_string(),
            public_url: None,
            tunnel_command: None,
        }
    }
}

/// Fetch and channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub min_refresh_interval_secs: u64,
    pub max_results: usize,
    pub poll_interval_secs: u64,
    pub fallback_poll_interval_secs: u64,
    pub debounce_ms: u64,
    pub renewal_lead_secs: u64,
    pub evaluate_interval_secs: u64,
    /// Where the active push subscription is remembered.
    pub state_path: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: 5,
            max_results: 50,
            poll_interval_secs: 60,
            fallback_poll_interval_secs: 30,
            debounce_ms: 500,
            renewal_lead_secs: 60,
            evaluate_interval_secs: 15,
            state_path: None,
        }
    }
}

/// Reminder settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub dismissal_path: Option<PathBuf>,
}

/// Logging settings. `--debug` and `RUST_LOG` take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: TracingOutputFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: TracingOutputFormat::Pretty,
        }
    }
}

impl ClientConfig {
    /// Loads `path`, or the default file when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vivcal")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vivcal")
    }

    /// Checks everything that can be checked without network access.
    pub fn validate(&self) -> ClientResult<()> {
        self.google.to_provider_config()?;
        self.webhook.tunnel()?;

        if self.sync.max_results == 0 {
            return Err(ClientError::Config("sync.max_results must be at least 1".to_string()));
        }
        let intervals = [
            ("sync.poll_interval_secs", self.sync.poll_interval_secs),
            ("sync.fallback_poll_interval_secs", self.sync.fallback_poll_interval_secs),
            ("sync.evaluate_interval_secs", self.sync.evaluate_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ClientError::Config(format!("{} must be greater than zero", name)));
        }
        if vivcal_core::parse_level(&self.log.level).is_none() {
            return Err(ClientError::Config(format!(
                "unknown log level '{}'",
                self.log.level
            )));
        }
        Ok(())
    }

    /// Engine settings. Unset state paths default to the data directory.
    pub fn engine_config(&self) -> EngineConfig {
        let sync = &self.sync;
        let data_dir = Self::default_data_dir();

        let fetch = FetchConfig::default()
            .with_min_refresh_interval(Duration::from_secs(sync.min_refresh_interval_secs))
            .with_max_results(sync.max_results);

        let channel = ChannelConfig::default()
            .with_listen(self.webhook.listen)
            .with_path(self.webhook.path.clone())
            .with_poll_intervals(
                Duration::from_secs(sync.poll_interval_secs),
                Duration::from_secs(sync.fallback_poll_interval_secs),
            )
            .with_debounce(Duration::from_millis(sync.debounce_ms))
            .with_renewal_lead(Duration::from_secs(sync.renewal_lead_secs))
            .with_state_path(
                sync.state_path
                    .clone()
                    .unwrap_or_else(|| data_dir.join("channel.json")),
            );

        EngineConfig::default()
            .with_fetch(fetch)
            .with_channel(channel)
            .with_evaluate_interval(Duration::from_secs(sync.evaluate_interval_secs))
            .with_dismissal_path(
                self.reminders
                    .dismissal_path
                    .clone()
                    .unwrap_or_else(|| data_dir.join("dismissed.json")),
            )
    }
}

impl GoogleSettings {
    /// Resolves the client credentials.
    pub fn credentials(&self) -> ClientResult<vivcal_providers::google::OAuthCredentials> {
        use vivcal_providers::google::OAuthCredentials;

        if let Some(path) = &self.credentials_file {
            return Ok(OAuthCredentials::from_file(path)?);
        }

        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok(OAuthCredentials::new(id, secret)),
            (Some(_), None) => Err(ClientError::Config(
                "client_secret is missing from the [google] section".to_string(),
            )),
            _ => Err(ClientError::Config(format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 credentials_file = \"/path/to/credentials.json\"",
                ClientConfig::default_path().display()
            ))),
        }
    }

    /// Builds the provider configuration.
    pub fn to_provider_config(&self) -> ClientResult<vivcal_providers::google::GoogleConfig> {
        use vivcal_providers::google::GoogleConfig;

        let mut config = GoogleConfig::new(self.credentials()?)
            .with_calendar_id(&self.calendar_id)
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(path) = &self.token_path {
            config = config.with_token_path(path);
        }
        config.validate().map_err(ClientError::Config)?;
        Ok(config)
    }
}

impl WebhookSettings {
    /// The tunnel to expose the listener with, if any. A fixed `public_url`
    /// wins over `tunnel_command`.
    pub fn tunnel(&self) -> ClientResult<Option<Arc<dyn Tunnel>>> {
        if let Some(url) = &self.public_url {
            if !url.starts_with("https://") {
                return Err(ClientError::Config(format!(
                    "webhook.public_url must be an https URL, got '{}'",
                    url
                )));
            }
            return Ok(Some(Arc::new(StaticTunnel::new(url))));
        }
        match &self.tunnel_command {
            Some(command) => Ok(Some(Arc::new(CommandTunnel::new(command)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod parsing {
        use super::*;

        #[test]
        fn empty_file_is_all_defaults() {
            let config = ClientConfig::parse("").unwrap();
            assert_eq!(config.google.calendar_id, "primary");
            assert_eq!(config.webhook.listen.port(), 8085);
            assert_eq!(config.webhook.path, "/calendar-webhook");
            assert_eq!(config.sync.poll_interval_secs, 60);
            assert_eq!(config.log.format, TracingOutputFormat::Pretty);
        }

        #[test]
        fn partial_sections_keep_other_defaults() {
            let config = ClientConfig::parse(
                r#"
[webhook]
listen = "0.0.0.0:9000"

[sync]
debounce_ms = 250

[log]
format = "json"
"#,
            )
            .unwrap();
            assert_eq!(config.webhook.listen.port(), 9000);
            assert_eq!(config.webhook.path, "/calendar-webhook");
            assert_eq!(config.sync.debounce_ms, 250);
            assert_eq!(config.sync.max_results, 50);
            assert_eq!(config.log.format, TracingOutputFormat::Json);
            assert_eq!(config.log.level, "info");
        }

        #[test]
        fn unknown_format_is_rejected() {
            let err = ClientConfig::parse("[log]\nformat = \"xml\"\n").unwrap_err();
            assert!(matches!(err, ClientError::Config(_)));
        }

        #[test]
        fn dump_parses_back() {
            let original = ClientConfig::parse("[google]\nclient_id = \"id\"\n").unwrap();
            let dumped = toml::to_string_pretty(&original).unwrap();
            let parsed = ClientConfig::parse(&dumped).unwrap();
            assert_eq!(parsed.google.client_id.as_deref(), Some("id"));
        }

        #[test]
        fn missing_explicit_file_errors() {
            let dir = TempDir::new().unwrap();
            let err = ClientConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
            assert!(err.to_string().contains("failed to read"));
        }

        #[test]
        fn explicit_file_is_loaded() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "[google]\ncalendar_id = \"team@example.com\"\n").unwrap();
            let config = ClientConfig::load(Some(&path)).unwrap();
            assert_eq!(config.google.calendar_id, "team@example.com");
        }
    }

    mod google {
        use super::*;

        #[test]
        fn inline_credentials() {
            let settings = GoogleSettings {
                client_id: Some("id.apps.googleusercontent.com".to_string()),
                client_secret: Some("secret".to_string()),
                ..Default::default()
            };
            let config = settings.to_provider_config().unwrap();
            assert_eq!(config.credentials.client_id, "id.apps.googleusercontent.com");
            assert_eq!(config.calendar_id, "primary");
            assert_eq!(config.timeout, Duration::from_secs(30));
        }

        #[test]
        fn credentials_file_wins() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("credentials.json");
            std::fs::write(
                &path,
                r#"{"installed": {"client_id": "file-id", "client_secret": "file-secret"}}"#,
            )
            .unwrap();

            let settings = GoogleSettings {
                credentials_file: Some(path),
                client_id: Some("inline-id".to_string()),
                client_secret: Some("inline-secret".to_string()),
                ..Default::default()
            };
            let credentials = settings.credentials().unwrap();
            assert_eq!(credentials.client_id, "file-id");
        }

        #[test]
        fn missing_secret() {
            let settings = GoogleSettings {
                client_id: Some("id".to_string()),
                ..Default::default()
            };
            let err = settings.credentials().unwrap_err();
            assert!(err.to_string().contains("client_secret"));
        }

        #[test]
        fn missing_everything() {
            let err = GoogleSettings::default().credentials().unwrap_err();
            assert!(err.to_string().contains("credentials not found"));
        }
    }

    mod engine {
        use super::*;

        #[test]
        fn settings_flow_into_engine_config() {
            let config = ClientConfig::parse(
                r#"
[webhook]
listen = "127.0.0.1:9999"
path = "hook"

[sync]
min_refresh_interval_secs = 10
max_results = 20
fallback_poll_interval_secs = 45
debounce_ms = 100
evaluate_interval_secs = 5
state_path = "/tmp/vivcal/channel.json"

[reminders]
dismissal_path = "/tmp/vivcal/dismissed.json"
"#,
            )
            .unwrap();
            let engine = config.engine_config();

            assert_eq!(engine.fetch.min_refresh_interval, Duration::from_secs(10));
            assert_eq!(engine.fetch.max_results, 20);
            assert_eq!(engine.channel.listen.port(), 9999);
            assert_eq!(engine.channel.path, "/hook");
            assert_eq!(engine.channel.poll_interval, Duration::from_secs(60));
            assert_eq!(engine.channel.fallback_poll_interval, Duration::from_secs(45));
            assert_eq!(engine.channel.debounce, Duration::from_millis(100));
            assert_eq!(engine.evaluate_interval, Duration::from_secs(5));
            assert_eq!(
                engine.channel.state_path.as_deref(),
                Some(Path::new("/tmp/vivcal/channel.json"))
            );
            assert_eq!(
                engine.dismissal_path.as_deref(),
                Some(Path::new("/tmp/vivcal/dismissed.json"))
            );
        }

        #[test]
        fn state_paths_default_to_data_dir() {
            let engine = ClientConfig::default().engine_config();
            let data_dir = ClientConfig::default_data_dir();
            assert_eq!(engine.dismissal_path, Some(data_dir.join("dismissed.json")));
            assert_eq!(engine.channel.state_path, Some(data_dir.join("channel.json")));
        }
    }

    mod validation {
        use super::*;

        fn valid() -> ClientConfig {
            let mut config = ClientConfig::default();
            config.google.client_id = Some("id".to_string());
            config.google.client_secret = Some("secret".to_string());
            config
        }

        #[test]
        fn defaults_with_credentials_are_valid() {
            valid().validate().unwrap();
        }

        #[test]
        fn zero_interval() {
            let mut config = valid();
            config.sync.evaluate_interval_secs = 0;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("sync.evaluate_interval_secs"));
        }

        #[test]
        fn bad_log_level() {
            let mut config = valid();
            config.log.level = "loud".to_string();
            assert!(config.validate().is_err());
        }

        #[test]
        fn public_url_must_be_https() {
            let mut config = valid();
            config.webhook.public_url = Some("http://example.com".to_string());
            assert!(config.validate().is_err());
        }

        #[test]
        fn public_url_wins_over_command() {
            let settings = WebhookSettings {
                public_url: Some("https://hooks.example.com".to_string()),
                tunnel_command: Some("lt --port 8085".to_string()),
                ..Default::default()
            };
            assert!(settings.tunnel().unwrap().is_some());
        }

        #[test]
        fn no_tunnel_configured() {
            assert!(WebhookSettings::default().tunnel().unwrap().is_none());
        }
    }
}
