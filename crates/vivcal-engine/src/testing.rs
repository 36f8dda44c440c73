//! Test doubles shared by the engine's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tokio::sync::oneshot;
use vivcal_core::{CalendarEvent, EventTime};
use vivcal_providers::{
    BoxFuture, CalendarUpstream, ListQuery, ProviderError, ProviderResult, Subscription,
};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::tunnel::{Tunnel, TunnelSession};

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A timed event `[start, start + minutes)` last modified at `updated`.
pub fn event_at(id: &str, start: DateTime<Utc>, minutes: i64) -> CalendarEvent {
    CalendarEvent::new(
        id,
        format!("Meeting {}", id),
        EventTime::from_utc(start),
        EventTime::from_utc(start + Duration::minutes(minutes)),
        utc(2025, 1, 1, 0, 0, 0),
    )
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// In-memory upstream that answers list queries from a fixed event list.
pub struct FakeUpstream {
    events: Mutex<Vec<CalendarEvent>>,
    list_error: Mutex<Option<fn() -> ProviderError>>,
    subscribe_error: Mutex<Option<fn() -> ProviderError>>,
    subscription_ttl: Mutex<Duration>,
    clock: ManualClock,
    pub list_calls: AtomicUsize,
    pub queries: Mutex<Vec<ListQuery>>,
    /// `(channel_id, callback_url)` of every subscribe call.
    pub subscribed: Mutex<Vec<(String, String)>>,
    pub unsubscribed: Mutex<Vec<String>>,
}

impl FakeUpstream {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            list_error: Mutex::new(None),
            subscribe_error: Mutex::new(None),
            subscription_ttl: Mutex::new(Duration::hours(1)),
            clock,
            list_calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_events(&self, events: Vec<CalendarEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn fail_list(&self, error: Option<fn() -> ProviderError>) {
        *self.list_error.lock().unwrap() = error;
    }

    pub fn fail_subscribe(&self, error: Option<fn() -> ProviderError>) {
        *self.subscribe_error.lock().unwrap() = error;
    }

    pub fn set_subscription_ttl(&self, ttl: Duration) {
        *self.subscription_ttl.lock().unwrap() = ttl;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn subscribed_ids(&self) -> Vec<String> {
        self.subscribed
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn unsubscribed_ids(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }
}

impl CalendarUpstream for FakeUpstream {
    fn name(&self) -> &str {
        "fake"
    }

    fn list_events(&self, query: ListQuery) -> BoxFuture<'_, ProviderResult<Vec<CalendarEvent>>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());

        let result = match *self.list_error.lock().unwrap() {
            Some(error) => Err(error()),
            None => {
                let mut matching: Vec<_> = self
                    .events
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|e| e.end_utc() > query.time_min)
                    .filter(|e| query.time_max.is_none_or(|max| e.start_utc() < max))
                    .cloned()
                    .collect();
                matching.sort_by_key(|e| e.start_utc());
                if let Some(max) = query.max_results {
                    matching.truncate(max);
                }
                Ok(matching)
            }
        };
        Box::pin(async move { result })
    }

    fn subscribe<'a>(
        &'a self,
        channel_id: &'a str,
        callback_url: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Subscription>> {
        let result = match *self.subscribe_error.lock().unwrap() {
            Some(error) => Err(error()),
            None => {
                self.subscribed
                    .lock()
                    .unwrap()
                    .push((channel_id.to_string(), callback_url.to_string()));
                Ok(Subscription {
                    channel_id: channel_id.to_string(),
                    resource_id: Some(format!("resource-{}", channel_id)),
                    expiration: self.clock.now() + *self.subscription_ttl.lock().unwrap(),
                })
            }
        };
        Box::pin(async move { result })
    }

    fn unsubscribe<'a>(&'a self, subscription: &'a Subscription) -> BoxFuture<'a, ProviderResult<()>> {
        self.unsubscribed
            .lock()
            .unwrap()
            .push(subscription.channel_id.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Tunnel whose sessions close when the test says so.
pub struct FakeTunnel {
    pub url: String,
    fail: AtomicBool,
    pub opens: AtomicUsize,
    close_tx: Mutex<Option<oneshot::Sender<String>>>,
}

impl FakeTunnel {
    pub const URL: &'static str = "https://fake.tunnel.test";

    pub fn new() -> Self {
        Self {
            url: Self::URL.to_string(),
            fail: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            close_tx: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Ends the current session.
    pub fn close(&self, reason: &str) {
        if let Some(tx) = self.close_tx.lock().unwrap().take() {
            let _ = tx.send(reason.to_string());
        }
    }
}

impl Tunnel for FakeTunnel {
    fn open(&self) -> BoxFuture<'_, EngineResult<TunnelSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(EngineError::tunnel("connection refused"))
        } else {
            let (tx, rx) = oneshot::channel();
            *self.close_tx.lock().unwrap() = Some(tx);
            Ok(TunnelSession {
                public_url: self.url.clone(),
                closed: Box::pin(async move {
                    rx.await.unwrap_or_else(|_| "tunnel dropped".to_string())
                }),
            })
        };
        Box::pin(async move { result })
    }
}
