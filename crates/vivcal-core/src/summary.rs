//! One-line status text for the next meeting.
//!
//! The line names the current (or next) event and how far away it is, e.g.
//! `Standup in 1h 20m`. When the following event starts within 30 minutes it
//! takes over the line with its title shortened to 20 characters.

use chrono::{DateTime, Duration, Utc};

use crate::event::{CalendarEvent, EventSet};

/// Window within which the following event replaces the current one.
pub const NEXT_EVENT_TAKEOVER: Duration = Duration::minutes(30);

const TAKEOVER_TITLE_WIDTH: usize = 20;

/// Relative start time: `now`, `in 45m`, `in 2h`, `in 1h 20m`.
///
/// Minutes are rounded to the nearest ten.
pub fn time_until(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (start - now).num_minutes();
    if minutes <= 0 {
        return "now".to_string();
    }

    let hours = minutes / 60;
    let rounded = ((minutes % 60 + 5) / 10) * 10;
    match (hours, rounded) {
        (0, 0) => "now".to_string(),
        (0, m) => format!("in {m}m"),
        (h, 0) => format!("in {h}h"),
        (h, m) => format!("in {h}h {m}m"),
    }
}

/// Shortens `text` to at most `max_len` characters, ending with `..`.
pub fn ellipsis(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}..", kept.trim_end())
}

/// Builds the status line from the upcoming events (ended events already removed).
pub fn status_line(upcoming: &EventSet, now: DateTime<Utc>) -> String {
    let Some(current) = upcoming.first() else {
        return "No upcoming events".to_string();
    };

    match upcoming.iter().nth(1) {
        Some(next) if next.starts_in(now) <= NEXT_EVENT_TAKEOVER => format!(
            "{} {}",
            ellipsis(&next.title, TAKEOVER_TITLE_WIDTH),
            time_until(next.start_utc(), now)
        ),
        _ => describe(current, now),
    }
}

fn describe(event: &CalendarEvent, now: DateTime<Utc>) -> String {
    format!("{} {}", event.title, time_until(event.start_utc(), now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::EventTime;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn event(id: &str, title: &str, start: DateTime<Utc>, minutes: i64) -> CalendarEvent {
        CalendarEvent::new(
            id,
            title,
            EventTime::from_utc(start),
            EventTime::from_utc(start + Duration::minutes(minutes)),
            utc(2025, 1, 1, 0, 0, 0),
        )
    }

    mod time_until {
        use super::*;

        #[test]
        fn rounds_to_tens() {
            let now = utc(2025, 2, 5, 9, 0, 0);
            assert_eq!(time_until(utc(2025, 2, 5, 10, 24, 0), now), "in 1h 20m");
            assert_eq!(time_until(utc(2025, 2, 5, 10, 25, 0), now), "in 1h 30m");
            assert_eq!(time_until(utc(2025, 2, 5, 9, 45, 0), now), "in 50m");
            assert_eq!(time_until(utc(2025, 2, 5, 11, 2, 0), now), "in 2h");
        }

        #[test]
        fn near_or_past_is_now() {
            let now = utc(2025, 2, 5, 9, 0, 0);
            assert_eq!(time_until(utc(2025, 2, 5, 9, 3, 0), now), "now");
            assert_eq!(time_until(utc(2025, 2, 5, 8, 30, 0), now), "now");
        }
    }

    mod ellipsis {
        use super::*;

        #[test]
        fn short_text_untouched() {
            assert_eq!(ellipsis("Standup", 20), "Standup");
        }

        #[test]
        fn long_text_cut() {
            insta::assert_snapshot!(ellipsis("Quarterly planning with finance", 20), @"Quarterly plannin..");
        }

        #[test]
        fn trailing_space_trimmed_before_marker() {
            assert_eq!(ellipsis("abcd efgh", 8), "abcd..");
        }
    }

    mod status_line {
        use super::*;

        #[test]
        fn empty() {
            insta::assert_snapshot!(status_line(&EventSet::empty(), utc(2025, 2, 5, 9, 0, 0)), @"No upcoming events");
        }

        #[test]
        fn single_event() {
            let now = utc(2025, 2, 5, 9, 0, 0);
            let set = EventSet::from_events(vec![event("a", "Standup", utc(2025, 2, 5, 10, 20, 0), 30)]);
            insta::assert_snapshot!(status_line(&set, now), @"Standup in 1h 20m");
        }

        #[test]
        fn next_event_takes_over_within_30_minutes() {
            let now = utc(2025, 2, 5, 9, 10, 0);
            let set = EventSet::from_events(vec![
                event("a", "Deep work", utc(2025, 2, 5, 9, 0, 0), 30),
                event("b", "Architecture review board", utc(2025, 2, 5, 9, 30, 0), 60),
            ]);
            insta::assert_snapshot!(status_line(&set, now), @"Architecture revi.. in 20m");
        }

        #[test]
        fn distant_next_event_ignored() {
            let now = utc(2025, 2, 5, 9, 10, 0);
            let set = EventSet::from_events(vec![
                event("a", "Deep work", utc(2025, 2, 5, 9, 0, 0), 120),
                event("b", "Lunch", utc(2025, 2, 5, 12, 0, 0), 60),
            ]);
            insta::assert_snapshot!(status_line(&set, now), @"Deep work now");
        }
    }
}
