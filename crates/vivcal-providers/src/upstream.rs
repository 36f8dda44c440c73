//! The [`CalendarUpstream`] trait: what the sync engine needs from a remote
//! calendar.
//!
//! An upstream lists events and manages push subscriptions ("watch
//! channels"). It does not cache, rate-limit or retry; those concerns belong to
//! the engine.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use vivcal_core::{CalendarEvent, TimeWindow};

use crate::error::ProviderResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Parameters for an event listing.
///
/// Events are returned with recurring series expanded into instances, ordered
/// by start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Lower bound on event end time.
    pub time_min: DateTime<Utc>,
    /// Upper bound on event start time. `None` means open-ended.
    pub time_max: Option<DateTime<Utc>>,
    /// Stop after this many events.
    pub max_results: Option<usize>,
}

impl ListQuery {
    pub fn starting_at(time_min: DateTime<Utc>) -> Self {
        Self {
            time_min,
            time_max: None,
            max_results: None,
        }
    }

    /// Query exactly the given window.
    pub fn for_window(window: &TimeWindow) -> Self {
        Self {
            time_min: window.start,
            time_max: Some(window.end),
            max_results: None,
        }
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }
}

/// An active push subscription as acknowledged by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Identifier chosen by the caller when subscribing.
    pub channel_id: String,
    /// Identifier of the watched resource, as assigned by the upstream.
    pub resource_id: Option<String>,
    pub expiration: DateTime<Utc>,
}

impl Subscription {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

/// A remote calendar.
pub trait CalendarUpstream: Send + Sync {
    /// Short name used in logs and errors, e.g. `google`.
    fn name(&self) -> &str;

    fn list_events(&self, query: ListQuery) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>>;

    /// Asks the upstream to POST change notifications to `callback_url`.
    fn subscribe<'a>(
        &'a self,
        channel_id: &'a str,
        callback_url: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Subscription>>;

    /// Stops a subscription. Stopping an unknown channel is an error upstream
    /// but harmless for the caller.
    fn unsubscribe<'a>(&'a self, subscription: &'a Subscription) -> BoxFuture<'a, ProviderResult<()>>;
}
