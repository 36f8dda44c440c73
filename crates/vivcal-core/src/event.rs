//! Calendar event types.
//!
//! - [`CalendarEvent`]: a single event as received from the upstream calendar
//! - [`EventSet`]: an immutable, ordered snapshot of events shared between components
//! - [`Attendee`] and [`ConferenceData`]: the participant and conferencing details
//!   the reminder needs

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::time::EventTime;

/// The response status for an event attendee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
    #[default]
    Unknown,
}

/// A participant or organizer of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub response_status: ResponseStatus,
    /// True when this attendee is the calendar owner.
    #[serde(default)]
    pub is_self: bool,
}

/// One way of joining a conference (video, phone, sip, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub entry_point_type: String,
    pub uri: String,
    pub label: Option<String>,
}

/// Conferencing descriptor attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceData {
    /// Solution key type, e.g. `hangoutsMeet` or `addOn`.
    pub conference_type: Option<String>,
    pub solution_name: Option<String>,
    pub entry_points: Vec<EntryPoint>,
}

impl ConferenceData {
    /// Returns the first entry point of type `video`.
    pub fn video_entry(&self) -> Option<&EntryPoint> {
        self.entry_points
            .iter()
            .find(|ep| ep.entry_point_type == "video")
    }
}

/// A calendar event.
///
/// Identifiers are unique within one user's calendar. When two records carry
/// the same identifier, the one with the later `updated` timestamp wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    pub organizer: Option<Attendee>,
    pub conference: Option<ConferenceData>,
    /// Explicit video link (Google's `hangoutLink`).
    pub hangout_link: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Canonical link to the event in the calendar web UI.
    pub html_link: Option<String>,
    /// Last modification time reported by the upstream.
    pub updated: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
        updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
            attendees: Vec::new(),
            organizer: None,
            conference: None,
            hangout_link: None,
            location: None,
            description: None,
            html_link: None,
            updated,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.to_utc_datetime()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.to_utc_datetime()
    }

    /// `start <= now < end`
    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        self.start_utc() <= now && now < self.end_utc()
    }

    /// Time from `now` until the event starts. Negative once it has started.
    pub fn starts_in(&self, now: DateTime<Utc>) -> Duration {
        self.start_utc() - now
    }

    pub fn with_attendees(mut self, attendees: Vec<Attendee>) -> Self {
        self.attendees = attendees;
        self
    }

    pub fn with_organizer(mut self, organizer: Attendee) -> Self {
        self.organizer = Some(organizer);
        self
    }

    pub fn with_conference(mut self, conference: ConferenceData) -> Self {
        self.conference = Some(conference);
        self
    }

    pub fn with_hangout_link(mut self, url: impl Into<String>) -> Self {
        self.hangout_link = Some(url.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_html_link(mut self, url: impl Into<String>) -> Self {
        self.html_link = Some(url.into());
        self
    }
}

/// An ordered, immutable snapshot of events.
///
/// Events are sorted ascending by start instant, ties broken by identifier.
/// Cloning is cheap; the underlying vector is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSet(Arc<Vec<CalendarEvent>>);

impl EventSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a set from events in any order.
    ///
    /// Identifiers are expected to be unique already; deduplication is the
    /// cache's job.
    pub fn from_events(mut events: Vec<CalendarEvent>) -> Self {
        events.sort_by(|a, b| {
            a.start_utc()
                .cmp(&b.start_utc())
                .then_with(|| a.id.cmp(&b.id))
        });
        Self(Arc::new(events))
    }

    pub fn get(&self, id: &str) -> Option<&CalendarEvent> {
        self.0.iter().find(|e| e.id == id)
    }

    /// Events that have not ended at `now`, in order.
    pub fn upcoming(&self, now: DateTime<Utc>) -> EventSet {
        let events: Vec<_> = self
            .0
            .iter()
            .filter(|e| e.end_utc() > now)
            .cloned()
            .collect();
        Self(Arc::new(events))
    }

    pub fn to_vec(&self) -> Vec<CalendarEvent> {
        self.0.as_ref().clone()
    }
}

impl Deref for EventSet {
    type Target = [CalendarEvent];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<CalendarEvent>> for EventSet {
    fn from(events: Vec<CalendarEvent>) -> Self {
        Self::from_events(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn event(id: &str, start_hour: u32, end_hour: u32) -> CalendarEvent {
        CalendarEvent::new(
            id,
            format!("Event {id}"),
            EventTime::from_utc(utc(2025, 2, 5, start_hour, 0, 0)),
            EventTime::from_utc(utc(2025, 2, 5, end_hour, 0, 0)),
            utc(2025, 2, 1, 0, 0, 0),
        )
    }

    mod calendar_event {
        use super::*;

        #[test]
        fn builder_pattern() {
            let e = event("a", 10, 11)
                .with_location("Room 1")
                .with_description("Agenda")
                .with_hangout_link("https://meet.google.com/abc-defg-hij")
                .with_html_link("https://calendar.google.com/event?eid=a");

            assert_eq!(e.location.as_deref(), Some("Room 1"));
            assert_eq!(e.description.as_deref(), Some("Agenda"));
            assert!(e.hangout_link.is_some());
            assert!(e.html_link.is_some());
            assert!(!e.is_all_day());
        }

        #[test]
        fn ongoing_is_half_open() {
            let e = event("a", 10, 11);
            assert!(!e.is_ongoing_at(utc(2025, 2, 5, 9, 59, 59)));
            assert!(e.is_ongoing_at(utc(2025, 2, 5, 10, 0, 0)));
            assert!(!e.is_ongoing_at(utc(2025, 2, 5, 11, 0, 0)));
        }

        #[test]
        fn starts_in() {
            let e = event("a", 10, 11);
            assert_eq!(e.starts_in(utc(2025, 2, 5, 9, 30, 0)), Duration::minutes(30));
            assert_eq!(e.starts_in(utc(2025, 2, 5, 10, 5, 0)), Duration::minutes(-5));
        }

        #[test]
        fn video_entry_point() {
            let conf = ConferenceData {
                conference_type: Some("hangoutsMeet".into()),
                solution_name: Some("Google Meet".into()),
                entry_points: vec![
                    EntryPoint {
                        entry_point_type: "phone".into(),
                        uri: "tel:+1-555".into(),
                        label: None,
                    },
                    EntryPoint {
                        entry_point_type: "video".into(),
                        uri: "https://meet.google.com/abc-defg-hij".into(),
                        label: Some("meet.google.com/abc-defg-hij".into()),
                    },
                ],
            };
            assert_eq!(
                conf.video_entry().map(|ep| ep.uri.as_str()),
                Some("https://meet.google.com/abc-defg-hij")
            );
        }
    }

    mod event_set {
        use super::*;

        #[test]
        fn sorted_by_start_then_id() {
            let set = EventSet::from_events(vec![event("c", 12, 13), event("b", 10, 11), event("a", 10, 12)]);
            let ids: Vec<_> = set.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);
        }

        #[test]
        fn upcoming_drops_ended_events() {
            let set = EventSet::from_events(vec![event("a", 8, 9), event("b", 9, 11), event("c", 12, 13)]);
            let upcoming = set.upcoming(utc(2025, 2, 5, 10, 0, 0));
            let ids: Vec<_> = upcoming.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["b", "c"]);

            // an event ending exactly now is over
            let upcoming = set.upcoming(utc(2025, 2, 5, 11, 0, 0));
            assert_eq!(upcoming.len(), 1);
        }

        #[test]
        fn get_by_id() {
            let set = EventSet::from_events(vec![event("a", 8, 9)]);
            assert!(set.get("a").is_some());
            assert!(set.get("zzz").is_none());
        }

        #[test]
        fn clones_share_storage() {
            let set = EventSet::from_events(vec![event("a", 8, 9)]);
            let copy = set.clone();
            assert!(Arc::ptr_eq(&set.0, &copy.0));
            assert!(EventSet::empty().is_empty());
        }
    }
}
