//! Google Calendar upstream.
//!
//! - [`GoogleCalendar`]: the [`CalendarUpstream`](crate::CalendarUpstream) implementation
//! - [`GoogleTokenRefresher`]: `refresh_token` grant against the OAuth endpoint
//! - [`GoogleConfig`] / [`OAuthCredentials`]: settings and client credentials
//!
//! ```ignore
//! use vivcal_providers::google::{GoogleCalendar, GoogleConfig, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::from_file("credentials.json")?;
//! let upstream = GoogleCalendar::new(&GoogleConfig::new(credentials))?;
//! ```

mod client;
mod config;
mod oauth;
mod upstream;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::GoogleTokenRefresher;
pub use upstream::GoogleCalendar;
