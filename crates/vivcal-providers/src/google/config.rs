//! Google Calendar configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// OAuth client credentials registered in the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// `credentials.json` as downloaded from the console, or the flat variant
/// written by gcloud.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Accepts `{"installed": {...}}`, `{"web": {...}}` or a flat
    /// `{"client_id", "client_secret"}` object.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ProviderError::configuration(
            "credentials must contain an 'installed'/'web' section or a root level 'client_id'/'client_secret'",
        ))
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Settings for [`GoogleCalendar`](super::GoogleCalendar).
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    /// Calendar to read and watch. Defaults to `primary`.
    pub calendar_id: String,
    pub token_path: PathBuf,
    pub timeout: Duration,
    pub user_agent: String,
    /// Calendar API root; overridable for tests and proxies.
    pub api_base: String,
    pub token_url: String,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            calendar_id: "primary".to_string(),
            token_path: Self::default_token_path(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("vivcal/{}", env!("CARGO_PKG_VERSION")),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// `<config dir>/vivcal/token.json`
    pub fn default_token_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vivcal")
            .join("token.json")
    }

    pub fn with_calendar_id(mut self, id: impl Into<String>) -> Self {
        self.calendar_id = id.into();
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;
        if self.calendar_id.trim().is_empty() {
            return Err("calendar_id must not be empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    mod credentials {
        use super::*;

        #[test]
        fn validation() {
            assert!(credentials().validate().is_ok());
            assert!(OAuthCredentials::new("", "secret").validate().is_err());
            assert!(OAuthCredentials::new("bad-id", "secret").validate().is_err());
            assert!(
                OAuthCredentials::new("x.apps.googleusercontent.com", "")
                    .validate()
                    .is_err()
            );
        }

        #[test]
        fn installed_section() {
            let json = r#"{"installed": {"client_id": "id.apps.googleusercontent.com", "client_secret": "s", "project_id": "p"}}"#;
            let creds = OAuthCredentials::from_json(json).unwrap();
            assert_eq!(creds, OAuthCredentials::new("id.apps.googleusercontent.com", "s"));
        }

        #[test]
        fn web_section() {
            let json = r#"{"web": {"client_id": "web.apps.googleusercontent.com", "client_secret": "w"}}"#;
            assert_eq!(OAuthCredentials::from_json(json).unwrap().client_secret, "w");
        }

        #[test]
        fn flat_format() {
            let json = r#"{"client_id": "flat.apps.googleusercontent.com", "client_secret": "f", "refresh_token": "r"}"#;
            assert_eq!(
                OAuthCredentials::from_json(json).unwrap().client_id,
                "flat.apps.googleusercontent.com"
            );
        }

        #[test]
        fn missing_fields() {
            let err = OAuthCredentials::from_json(r#"{"other": {}}"#).unwrap_err();
            assert!(err.message().contains("client_id"));
            let err = OAuthCredentials::from_json("not json").unwrap_err();
            assert!(err.message().contains("parse"));
        }
    }

    mod config {
        use super::*;

        #[test]
        fn defaults() {
            let config = GoogleConfig::new(credentials());
            assert_eq!(config.calendar_id, "primary");
            assert_eq!(config.api_base, GoogleConfig::DEFAULT_API_BASE);
            assert!(config.token_path.ends_with("vivcal/token.json"));
            assert!(config.validate().is_ok());
        }

        #[test]
        fn builders() {
            let config = GoogleConfig::new(credentials())
                .with_calendar_id("team@example.com")
                .with_timeout(Duration::from_secs(5))
                .with_api_base("http://127.0.0.1:9999/")
                .with_token_path("/tmp/t.json");
            assert_eq!(config.calendar_id, "team@example.com");
            assert_eq!(config.api_base, "http://127.0.0.1:9999");
            assert_eq!(config.token_path, PathBuf::from("/tmp/t.json"));
        }

        #[test]
        fn rejects_empty_calendar() {
            let config = GoogleConfig::new(credentials()).with_calendar_id(" ");
            assert!(config.validate().is_err());
        }
    }
}
