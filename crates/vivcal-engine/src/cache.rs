//! In-memory event cache.
//!
//! The cache holds the current [`EventSet`] and the set of calendar days whose
//! range fetch has completed. Nothing here is persisted; the cache can always
//! be rebuilt from upstream.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use vivcal_core::{CalendarEvent, EventSet};

/// Digest of the parts of an event set that matter for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeHash(String);

impl ChangeHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unions two event sets by identifier.
///
/// On an identifier collision the record with the later `updated` timestamp
/// is kept; on a tie the incoming record wins. The result is re-sorted.
pub fn merge(existing: &EventSet, incoming: &EventSet) -> EventSet {
    if incoming.is_empty() {
        return existing.clone();
    }

    let mut by_id: HashMap<&str, &CalendarEvent> = existing
        .iter()
        .map(|event| (event.id.as_str(), event))
        .collect();

    for event in incoming.iter() {
        let cached_is_newer = by_id
            .get(event.id.as_str())
            .is_some_and(|current| current.updated > event.updated);
        if cached_is_newer {
            trace!(id = %event.id, "keeping newer cached record");
        } else {
            by_id.insert(event.id.as_str(), event);
        }
    }

    EventSet::from_events(by_id.into_values().cloned().collect())
}

/// SHA-256 over the ordered `(id, start, updated)` triples.
///
/// Titles, attendees and other cosmetic fields do not contribute: an upstream
/// response that differs only in those is not a change.
pub fn compute_change_hash(events: &EventSet) -> ChangeHash {
    let mut hasher = Sha256::new();
    for event in events.iter() {
        hasher.update(event.id.as_bytes());
        hasher.update([0]);
        hasher.update(event.start_utc().timestamp().to_le_bytes());
        hasher.update([u8::from(event.is_all_day())]);
        hasher.update(event.updated.timestamp_millis().to_le_bytes());
    }
    ChangeHash(hex::encode(hasher.finalize()))
}

/// Current events plus the days whose range fetch has completed.
#[derive(Debug, Default)]
pub struct EventCache {
    events: EventSet,
    fetched_days: HashSet<NaiveDate>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the cached events.
    pub fn events(&self) -> EventSet {
        self.events.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Replaces the cached events wholesale.
    pub fn replace(&mut self, events: EventSet) {
        debug!(count = events.len(), "replaced cached events");
        self.events = events;
    }

    /// Merges `incoming` into the cache and returns the new snapshot.
    pub fn merge_in(&mut self, incoming: &EventSet) -> EventSet {
        self.events = merge(&self.events, incoming);
        debug!(
            incoming = incoming.len(),
            total = self.events.len(),
            "merged events into cache"
        );
        self.events.clone()
    }

    /// Records that a fetch covering `day` completed, even if it was empty.
    pub fn mark_fetched(&mut self, day: NaiveDate) {
        self.fetched_days.insert(day);
    }

    pub fn is_fetched(&self, day: NaiveDate) -> bool {
        self.fetched_days.contains(&day)
    }

    /// Forgets all fetched days and marks `days` instead.
    pub fn reset_fetched(&mut self, days: impl IntoIterator<Item = NaiveDate>) {
        self.fetched_days.clear();
        self.fetched_days.extend(days);
    }

    pub fn fetched_days(&self) -> usize {
        self.fetched_days.len()
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
