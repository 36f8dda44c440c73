//! Access token refresh against Google's OAuth endpoint.
//!
//! Only the `refresh_token` grant is implemented. Obtaining the initial token
//! pair (browser consent) happens outside this crate; its output is the token
//! file [`TokenStorage`](crate::tokens::TokenStorage) loads.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::auth::{RefreshedToken, TokenRefresher};
use crate::error::{ProviderError, ProviderResult};
use crate::upstream::BoxFuture;

use super::config::OAuthCredentials;

/// Refreshes Google access tokens.
#[derive(Debug)]
pub struct GoogleTokenRefresher {
    credentials: OAuthCredentials,
    token_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

impl GoogleTokenRefresher {
    pub fn new(
        credentials: OAuthCredentials,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration("failed to create HTTP client").with_source(e)
            })?;

        Ok(Self {
            credentials,
            token_url: token_url.into(),
            http_client,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("token refresh request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "token refresh rejected ({}): {}",
                status, body
            ))
            .with_provider("google"));
        }

        let parsed = parse_token_response(&body)?;
        info!(expires_in = ?parsed.expires_in_secs, "refreshed access token");
        Ok(parsed)
    }
}

fn parse_token_response(body: &str) -> ProviderResult<RefreshedToken> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::invalid_response(format!("invalid token response: {}", e)))?;
    Ok(RefreshedToken {
        access_token: token.access_token,
        expires_in_secs: token.expires_in,
    })
}

impl TokenRefresher for GoogleTokenRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(self.refresh_token(refresh_token))
    }
}
