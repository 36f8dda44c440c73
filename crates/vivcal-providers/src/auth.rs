//! Bearer token access for upstream requests.
//!
//! [`CredentialGate`] hands out a valid access token, refreshing it through a
//! [`TokenRefresher`] once it has expired. Concurrent callers share a single
//! refresh.
//!
//! Failure classes:
//!
//! - no stored tokens, no refresh token, or the refresh endpoint rejecting the
//!   refresh token: authentication failure, the user must sign in again
//! - transport failure while refreshing: network error, retried on the next call

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::tokens::TokenStorage;
use crate::upstream::BoxFuture;

/// Source of bearer tokens for upstream requests.
pub trait Authenticator: Send + Sync {
    fn get_valid_token(&self) -> BoxFuture<'_, ProviderResult<String>>;
}

/// Result of exchanging a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in_secs: Option<i64>,
}

/// Exchanges a refresh token for a new access token.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>>;
}

/// Token store plus refresh-on-expiry.
pub struct CredentialGate<R> {
    storage: TokenStorage,
    refresher: R,
    refresh_lock: Mutex<()>,
}

impl<R: TokenRefresher> CredentialGate<R> {
    pub fn new(storage: TokenStorage, refresher: R) -> Self {
        Self {
            storage,
            refresher,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    /// Returns a usable access token, refreshing first when it has expired.
    pub async fn valid_token(&self) -> ProviderResult<String> {
        if let Some(tokens) = self.storage.get()
            && !tokens.is_expired()
        {
            return Ok(tokens.access_token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let tokens = self
            .storage
            .get()
            .ok_or_else(|| ProviderError::authentication("not signed in: no stored tokens"))?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }

        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            ProviderError::authentication("access token expired and no refresh token stored")
        })?;

        debug!("refreshing expired access token");
        let refreshed = self.refresher.refresh(refresh_token).await?;

        if let Err(e) = self
            .storage
            .update_access_token(&refreshed.access_token, refreshed.expires_in_secs)
        {
            warn!(error = %e, path = %self.storage.path().display(), "failed to persist refreshed token");
        }

        Ok(refreshed.access_token)
    }
}

impl<R: TokenRefresher> Authenticator for CredentialGate<R> {
    fn get_valid_token(&self) -> BoxFuture<'_, ProviderResult<String>> {
        Box::pin(self.valid_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::tokens::TokenInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Refresher returning a canned outcome and counting calls.
    struct FakeRefresher {
        calls: AtomicUsize,
        outcome: fn() -> ProviderResult<RefreshedToken>,
    }

    impl FakeRefresher {
        fn new(outcome: fn() -> ProviderResult<RefreshedToken>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome,
            }
        }
    }

    impl TokenRefresher for FakeRefresher {
        fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
            assert_eq!(refresh_token, "refresh");
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = (self.outcome)();
            Box::pin(async move { outcome })
        }
    }

    fn refreshed() -> ProviderResult<RefreshedToken> {
        Ok(RefreshedToken {
            access_token: "fresh".into(),
            expires_in_secs: Some(3600),
        })
    }

    fn rejected() -> ProviderResult<RefreshedToken> {
        Err(ProviderError::authentication("invalid_grant"))
    }

    fn offline() -> ProviderResult<RefreshedToken> {
        Err(ProviderError::network("connection refused"))
    }

    fn gate(dir: &TempDir, expires_in: Option<i64>, outcome: fn() -> ProviderResult<RefreshedToken>) -> CredentialGate<FakeRefresher> {
        let tokens = TokenInfo::new("stale", Some("refresh".into()), expires_in, vec![]);
        let storage = TokenStorage::with_tokens(dir.path().join("tokens.json"), tokens);
        CredentialGate::new(storage, FakeRefresher::new(outcome))
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir, Some(3600), refreshed);
        assert_eq!(gate.valid_token().await.unwrap(), "stale");
        assert_eq!(gate.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir, Some(0), refreshed);

        assert_eq!(gate.get_valid_token().await.unwrap(), "fresh");
        assert_eq!(gate.valid_token().await.unwrap(), "fresh");
        assert_eq!(gate.refresher.calls.load(Ordering::SeqCst), 1);

        let on_disk = TokenStorage::new(dir.path().join("tokens.json"));
        assert!(on_disk.load().unwrap());
        assert_eq!(on_disk.get().unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir, Some(0), refreshed);
        let (a, b) = tokio::join!(gate.valid_token(), gate.valid_token());
        assert_eq!(a.unwrap(), "fresh");
        assert_eq!(b.unwrap(), "fresh");
        assert_eq!(gate.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_is_authentication_failure() {
        let dir = TempDir::new().unwrap();
        let err = gate(&dir, Some(0), rejected).valid_token().await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn transport_failure_is_transient() {
        let dir = TempDir::new().unwrap();
        let err = gate(&dir, Some(0), offline).valid_token().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NetworkError);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_refresh_token() {
        let dir = TempDir::new().unwrap();
        let storage = TokenStorage::with_tokens(
            dir.path().join("tokens.json"),
            TokenInfo::new("stale", None, Some(0), vec![]),
        );
        let gate = CredentialGate::new(storage, FakeRefresher::new(refreshed));
        assert!(gate.valid_token().await.unwrap_err().is_authentication());
    }

    #[tokio::test]
    async fn no_tokens_at_all() {
        let dir = TempDir::new().unwrap();
        let gate = CredentialGate::new(
            TokenStorage::new(dir.path().join("tokens.json")),
            FakeRefresher::new(refreshed),
        );
        assert!(gate.valid_token().await.unwrap_err().is_authentication());
    }
}
