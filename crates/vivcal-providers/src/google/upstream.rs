//! [`CalendarUpstream`] for Google Calendar.

use std::sync::Arc;

use tracing::{debug, info};
use vivcal_core::CalendarEvent;

use crate::auth::{Authenticator, CredentialGate};
use crate::error::{ProviderError, ProviderResult};
use crate::tokens::TokenStorage;
use crate::upstream::{BoxFuture, CalendarUpstream, ListQuery, Subscription};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::GoogleTokenRefresher;

const PROVIDER_NAME: &str = "google";

/// Google Calendar upstream.
///
/// Every request first asks the [`Authenticator`] for a bearer token, so an
/// expired access token is refreshed transparently.
pub struct GoogleCalendar {
    calendar_id: String,
    client: GoogleCalendarClient,
    auth: Arc<dyn Authenticator>,
}

impl GoogleCalendar {
    /// Builds the upstream with a [`CredentialGate`] over the configured token
    /// file. A missing token file is not an error here; the first request
    /// reports it as an authentication failure.
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;

        let storage = TokenStorage::new(&config.token_path);
        if !storage.load()? {
            info!(path = %config.token_path.display(), "no stored Google tokens yet");
        }
        let refresher = GoogleTokenRefresher::new(
            config.credentials.clone(),
            &config.token_url,
            config.timeout,
        )?;

        Self::with_authenticator(config, Arc::new(CredentialGate::new(storage, refresher)))
    }

    /// Builds the upstream around any token source.
    pub fn with_authenticator(
        config: &GoogleConfig,
        auth: Arc<dyn Authenticator>,
    ) -> ProviderResult<Self> {
        let client = GoogleCalendarClient::new(&config.api_base, config.timeout, &config.user_agent)?;
        Ok(Self {
            calendar_id: config.calendar_id.clone(),
            client,
            auth,
        })
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    async fn token(&self) -> ProviderResult<String> {
        self.auth
            .get_valid_token()
            .await
            .map_err(|e| e.with_provider(PROVIDER_NAME))
    }
}

impl CalendarUpstream for GoogleCalendar {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn list_events(&self, query: ListQuery) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(async move {
            let token = self.token().await?;
            self.client
                .list_events(&token, &self.calendar_id, &query)
                .await
                .map_err(|e| e.with_provider(PROVIDER_NAME))
        })
    }

    fn subscribe<'a>(
        &'a self,
        channel_id: &'a str,
        callback_url: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Subscription>> {
        Box::pin(async move {
            let token = self.token().await?;
            let subscription = self
                .client
                .watch_events(&token, &self.calendar_id, channel_id, callback_url)
                .await
                .map_err(|e| e.with_provider(PROVIDER_NAME))?;
            debug!(
                channel_id = %subscription.channel_id,
                expiration = %subscription.expiration,
                "watch channel opened"
            );
            Ok(subscription)
        })
    }

    fn unsubscribe<'a>(&'a self, subscription: &'a Subscription) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let token = self.token().await?;
            self.client
                .stop_channel(&token, subscription)
                .await
                .map_err(|e| e.with_provider(PROVIDER_NAME))
        })
    }
}
