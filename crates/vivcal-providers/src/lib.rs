//! Remote calendar access for vivcal.
//!
//! - [`CalendarUpstream`]: listing events and managing push subscriptions
//! - [`Authenticator`] / [`CredentialGate`]: bearer tokens with refresh on expiry
//! - [`TokenStorage`]: persisted OAuth tokens
//! - [`ProviderError`]: failure classification shared by all of the above
//!
//! ```text
//! ┌──────────────┐   get_valid_token   ┌────────────────┐  refresh  ┌──────────────┐
//! │ GoogleCalendar├───────────────────▶│ CredentialGate ├──────────▶│ OAuth token  │
//! └──────┬───────┘                     └───────┬────────┘           │  endpoint    │
//!        │ events.list / watch / stop          │ TokenStorage       └──────────────┘
//!        ▼                                     ▼
//!   Calendar API v3                       token.json
//! ```

pub mod auth;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod tokens;
pub mod upstream;

pub use auth::{Authenticator, CredentialGate, RefreshedToken, TokenRefresher};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use tokens::{TokenInfo, TokenStorage};
pub use upstream::{BoxFuture, CalendarUpstream, ListQuery, Subscription};
