//! Upstream fetch coordination.
//!
//! [`FetchCoordinator`] is the only thing that calls
//! [`CalendarUpstream::list_events`]. It owns the [`EventCache`] and decides
//! when a refresh actually reaches the upstream:
//!
//! - non-forced refreshes within `min_refresh_interval` of the last successful
//!   fetch are served from a non-empty cache
//! - refreshes are serialized, so concurrent callers never double-fetch
//! - only authentication failures are reported; anything else falls back to
//!   the last known good events

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use vivcal_core::{EventSet, TimeWindow, start_of_day};
use vivcal_providers::{CalendarUpstream, ListQuery, ProviderError};

use crate::cache::{ChangeHash, EventCache, compute_change_hash, merge};
use crate::clock::Clock;
use crate::config::FetchConfig;
use crate::error::{EngineError, EngineResult};

/// Result of [`FetchCoordinator::refresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub events: EventSet,
    /// Whether the cached events were replaced.
    pub changed: bool,
}

#[derive(Debug, Default)]
struct RefreshState {
    last_fetch: Option<DateTime<Utc>>,
    last_hash: Option<ChangeHash>,
}

struct Inner {
    upstream: Arc<dyn CalendarUpstream>,
    clock: Arc<dyn Clock>,
    config: FetchConfig,
    cache: Mutex<EventCache>,
    /// Held for the whole of a refresh.
    refresh: tokio::sync::Mutex<RefreshState>,
}

/// Rate-limited access to the upstream event listing.
///
/// Cloning is cheap and clones share the cache.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

impl FetchCoordinator {
    pub fn new(upstream: Arc<dyn CalendarUpstream>, clock: Arc<dyn Clock>, config: FetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                upstream,
                clock,
                config,
                cache: Mutex::new(EventCache::new()),
                refresh: tokio::sync::Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Snapshot of the cached events.
    pub fn cached(&self) -> EventSet {
        self.cache().events()
    }

    pub fn is_fetched(&self, day: NaiveDate) -> bool {
        self.cache().is_fetched(day)
    }

    /// Instant of the last successful refresh listing.
    pub async fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.inner.refresh.lock().await.last_fetch
    }

    /// Refreshes the cache from the upstream.
    ///
    /// Lists from the start of yesterday with the configured result horizon.
    /// The cache is replaced only when the change hash differs from the one of
    /// the previous refresh.
    pub async fn refresh(&self, force: bool) -> EngineResult<RefreshOutcome> {
        let mut state = self.inner.refresh.lock().await;
        let now = self.inner.clock.now();

        if !force && self.within_gate(&state, now) {
            debug!("refresh within rate limit window, serving cache");
            return Ok(self.unchanged());
        }

        let tz = &self.inner.config.tz;
        let today = now.with_timezone(tz).date_naive();
        let yesterday = today.pred_opt().unwrap_or(today);
        let query = ListQuery::starting_at(start_of_day(yesterday, tz))
            .with_max_results(self.inner.config.max_results);

        let listed = match self.inner.upstream.list_events(query).await {
            Ok(listed) => listed,
            Err(e) => return self.fall_back(e).map(|()| self.unchanged()),
        };

        state.last_fetch = Some(now);
        let truncated = listed.len() >= self.inner.config.max_results;
        let incoming = merge(&EventSet::empty(), &EventSet::from_events(listed));
        let hash = compute_change_hash(&incoming);

        if state.last_hash.as_ref() == Some(&hash) {
            debug!(count = incoming.len(), "refresh returned no changes");
            return Ok(self.unchanged());
        }

        let covered = covered_days(&incoming, yesterday, today, truncated, tz);
        {
            let mut cache = self.cache();
            cache.replace(incoming.clone());
            cache.reset_fetched(covered);
        }
        info!(count = incoming.len(), hash = %hash, "event cache updated");
        state.last_hash = Some(hash);

        Ok(RefreshOutcome {
            events: incoming,
            changed: true,
        })
    }

    /// Fetches the 24 hours of one local day and merges them into the cache.
    ///
    /// The following day is then prefetched in the background, once; the
    /// prefetch does not prefetch further. Returns the cached events that
    /// overlap `day`.
    pub async fn fetch_range(&self, day: NaiveDate) -> EngineResult<EventSet> {
        let events = self.fetch_day(day).await?;

        if let Some(next) = day.succ_opt()
            && !self.is_fetched(next)
        {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.fetch_day(next).await {
                    warn!(day = %next, error = %e, "prefetch failed");
                }
            });
        }

        Ok(events)
    }

    async fn fetch_day(&self, day: NaiveDate) -> EngineResult<EventSet> {
        let window = TimeWindow::for_day(day, &self.inner.config.tz);

        if self.is_fetched(day) {
            debug!(day = %day, "day already fetched");
            return Ok(self.events_in(&window));
        }

        match self
            .inner
            .upstream
            .list_events(ListQuery::for_window(&window))
            .await
        {
            Ok(listed) => {
                let mut cache = self.cache();
                cache.merge_in(&EventSet::from_events(listed));
                cache.mark_fetched(day);
                debug!(day = %day, "fetched day");
            }
            Err(e) => self.fall_back(e)?,
        }

        Ok(self.events_in(&window))
    }

    fn within_gate(&self, state: &RefreshState, now: DateTime<Utc>) -> bool {
        let Some(last) = state.last_fetch else {
            return false;
        };
        let interval = Duration::from_std(self.inner.config.min_refresh_interval)
            .unwrap_or(Duration::zero());
        now - last < interval && !self.cache().is_empty()
    }

    /// Authentication failures are returned; everything else is logged.
    fn fall_back(&self, err: ProviderError) -> EngineResult<()> {
        if err.is_authentication() {
            error!(error = %err, "upstream rejected credentials");
            return Err(EngineError::from(err));
        }
        warn!(error = %err, "upstream fetch failed, serving cached events");
        Ok(())
    }

    fn unchanged(&self) -> RefreshOutcome {
        RefreshOutcome {
            events: self.cached(),
            changed: false,
        }
    }

    fn events_in(&self, window: &TimeWindow) -> EventSet {
        let cached = self.cached();
        EventSet::from_events(
            cached
                .iter()
                .filter(|e| window.overlaps(&e.start, &e.end))
                .cloned()
                .collect(),
        )
    }

    fn cache(&self) -> MutexGuard<'_, EventCache> {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Days a refresh listing is complete for: yesterday through the day of the
/// last returned event, or through today when that is later. A truncated
/// listing does not cover the day of its last event.
fn covered_days(
    events: &EventSet,
    yesterday: NaiveDate,
    today: NaiveDate,
    truncated: bool,
    tz: &chrono::FixedOffset,
) -> Vec<NaiveDate> {
    let last_day = events.last().map(|e| e.start.local_date(tz));
    let end = match (last_day, truncated) {
        (Some(last), true) => last.pred_opt().unwrap_or(last),
        (Some(last), false) => last.max(today),
        (None, _) => today,
    };
    yesterday.iter_days().take_while(|d| *d <= end).collect()
}
