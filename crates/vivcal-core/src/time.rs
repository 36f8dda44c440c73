//! Time types for calendar events.
//!
//! [`EventTime`] is the start or end of an event: either a specific instant or
//! an all-day date. Every comparison in the workspace goes through
//! [`EventTime::to_utc_datetime`], so there is exactly one place that decides
//! what instant an all-day date stands for.
//!
//! [`TimeWindow`] is a half-open `[start, end)` range used for upstream queries
//! and for the per-day range fetches.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Start or end time of a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day date without a time of day.
    AllDay(NaiveDate),
}

impl EventTime {
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day date.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the instant if this is a `DateTime` variant.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Converts to a UTC instant.
    ///
    /// All-day dates map to midnight UTC on that date.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Returns the calendar day this time falls on in the given offset.
    pub fn local_date(&self, tz: &FixedOffset) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.with_timezone(tz).date_naive(),
            Self::AllDay(date) => *date,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

/// Returns the UTC instant at which `date` begins in the given offset.
pub fn start_of_day(date: NaiveDate, tz: &FixedOffset) -> DateTime<Utc> {
    (date.and_time(NaiveTime::MIN) - Duration::seconds(i64::from(tz.local_minus_utc()))).and_utc()
}

/// A half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// The 24 hours of one local calendar day.
    pub fn for_day(date: NaiveDate, tz: &FixedOffset) -> Self {
        let start = start_of_day(date, tz);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// An event overlaps when it starts before the window ends and ends after
    /// the window starts.
    pub fn overlaps(&self, start: &EventTime, end: &EventTime) -> bool {
        start.to_utc_datetime() < self.end && end.to_utc_datetime() > self.start
    }
}
