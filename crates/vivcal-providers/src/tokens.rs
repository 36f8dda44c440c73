//! OAuth token persistence.
//!
//! Two on-disk shapes are accepted when loading:
//!
//! - the native shape written by [`TokenStorage::save`]
//! - the `token.json` written by Google's client libraries, with
//!   `expiry_date` in epoch milliseconds and space separated `scope`
//!
//! Saving always writes the native shape.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Access tokens are treated as expired this long before their real expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An OAuth token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// When the access token stops being usable. `None` means it never expires.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

/// `token.json` as written by googleapis client libraries.
#[derive(Debug, Deserialize)]
struct GoogleTokenFile {
    access_token: String,
    refresh_token: Option<String>,
    scope: Option<String>,
    expiry_date: Option<i64>,
}

impl From<GoogleTokenFile> for TokenInfo {
    fn from(file: GoogleTokenFile) -> Self {
        Self {
            access_token: file.access_token,
            refresh_token: file.refresh_token,
            expires_at: file.expiry_date.and_then(DateTime::from_timestamp_millis),
            scopes: file
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            last_refresh: Utc::now(),
        }
    }
}

impl TokenInfo {
    /// Builds a token set from an OAuth response. The expiry keeps a safety
    /// margin so requests never race the real expiry.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| expiry_from(now, secs)),
            scopes,
            last_refresh: now,
        }
    }

    /// Parses either the native or the googleapis shape.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        if let Ok(native) = serde_json::from_str::<TokenInfo>(json) {
            return Ok(native);
        }
        serde_json::from_str::<GoogleTokenFile>(json)
            .map(TokenInfo::from)
            .map_err(|e| ProviderError::configuration(format!("failed to parse token file: {}", e)))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Replaces the access token after a refresh. The refresh token is kept.
    pub fn update_access_token(&mut self, access_token: impl Into<String>, expires_in_secs: Option<i64>) {
        let now = Utc::now();
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(|secs| expiry_from(now, secs));
        self.last_refresh = now;
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in_secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// File-backed token store with an in-memory copy.
#[derive(Debug)]
pub struct TokenStorage {
    path: PathBuf,
    tokens: RwLock<Option<TokenInfo>>,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(None),
        }
    }

    /// Creates a storage that starts with `tokens` in memory.
    pub fn with_tokens(path: impl Into<PathBuf>, tokens: TokenInfo) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(Some(tokens)),
        }
    }

    /// Loads tokens from disk. Returns `Ok(false)` when no file exists.
    pub fn load(&self) -> ProviderResult<bool> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token file");
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to read token file: {}", e))
        })?;
        let tokens = TokenInfo::from_json(&content)?;

        info!(path = %self.path.display(), "loaded tokens");
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        Ok(true)
    }

    /// Writes the tokens atomically (temp file plus rename), mode 0600 on unix.
    pub fn save(&self) -> ProviderResult<()> {
        let content = {
            let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
            let tokens = tokens
                .as_ref()
                .ok_or_else(|| ProviderError::internal("no tokens to save"))?;
            serde_json::to_string_pretty(tokens)
                .map_err(|e| ProviderError::internal(format!("failed to serialize tokens: {}", e)))?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::configuration(format!("failed to write token file: {}", e))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to rename token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }

        debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    pub fn get(&self) -> Option<TokenInfo> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the tokens in memory, then persists them.
    pub fn set(&self, tokens: TokenInfo) -> ProviderResult<()> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        self.save()
    }

    /// Updates the in-memory access token, then persists. The in-memory update
    /// sticks even when the save fails.
    pub fn update_access_token(
        &self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
    ) -> ProviderResult<()> {
        {
            let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
            let Some(current) = tokens.as_mut() else {
                return Err(ProviderError::internal("no tokens to update"));
            };
            current.update_access_token(access_token, expires_in_secs);
        }
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod token_info {
        use super::*;

        #[test]
        fn fresh_token_not_expired() {
            let token = TokenInfo::new("access", Some("refresh".into()), Some(3600), vec![]);
            assert!(!token.is_expired());
            assert!(token.expires_at.unwrap() < Utc::now() + Duration::seconds(3600));
        }

        #[test]
        fn no_expiry_never_expires() {
            let token = TokenInfo::new("access", None, None, vec![]);
            assert!(!token.is_expired_at(Utc::now() + Duration::days(365)));
        }

        #[test]
        fn googleapis_token_file() {
            let json = r#"{
                "access_token": "ya29.a0",
                "refresh_token": "1//0g",
                "scope": "https://www.googleapis.com/auth/calendar.readonly openid",
                "token_type": "Bearer",
                "expiry_date": 1738749600000
            }"#;
            let token = TokenInfo::from_json(json).unwrap();
            assert_eq!(token.access_token, "ya29.a0");
            assert_eq!(token.refresh_token.as_deref(), Some("1//0g"));
            assert_eq!(token.scopes.len(), 2);
            assert_eq!(
                token.expires_at,
                DateTime::from_timestamp(1_738_749_600, 0)
            );
        }

        #[test]
        fn garbage_is_configuration_error() {
            let err = TokenInfo::from_json("{\"nope\": 1}").unwrap_err();
            assert_eq!(err.code(), crate::ProviderErrorCode::ConfigurationError);
        }
    }

    mod storage {
        use super::*;

        #[test]
        fn save_and_load_roundtrip() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("tokens.json");
            let storage = TokenStorage::new(&path);

            let token = TokenInfo::new("access", Some("refresh".into()), Some(3600), vec!["s".into()]);
            storage.set(token.clone()).unwrap();
            assert!(path.exists());

            let reloaded = TokenStorage::new(&path);
            assert!(reloaded.load().unwrap());
            assert_eq!(reloaded.get(), Some(token));
        }

        #[test]
        fn missing_file() {
            let dir = TempDir::new().unwrap();
            let storage = TokenStorage::new(dir.path().join("absent.json"));
            assert!(!storage.load().unwrap());
            assert!(storage.get().is_none());
        }

        #[test]
        fn update_keeps_refresh_token() {
            let dir = TempDir::new().unwrap();
            let storage = TokenStorage::with_tokens(
                dir.path().join("tokens.json"),
                TokenInfo::new("old", Some("refresh".into()), Some(0), vec![]),
            );
            storage.update_access_token("new", Some(3600)).unwrap();

            let tokens = storage.get().unwrap();
            assert_eq!(tokens.access_token, "new");
            assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
            assert!(!tokens.is_expired());
        }

        #[test]
        fn update_without_tokens_fails() {
            let dir = TempDir::new().unwrap();
            let storage = TokenStorage::new(dir.path().join("tokens.json"));
            assert!(storage.update_access_token("new", None).is_err());
        }

        #[cfg(unix)]
        #[test]
        fn saved_file_is_private() {
            use std::os::unix::fs::PermissionsExt;
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("tokens.json");
            TokenStorage::new(&path)
                .set(TokenInfo::new("a", None, None, vec![]))
                .unwrap();
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
