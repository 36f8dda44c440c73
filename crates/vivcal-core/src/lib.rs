//! Core types: event times, calendar events, meeting links, status text

pub mod event;
pub mod links;
pub mod summary;
pub mod time;
pub mod tracing;

pub use event::{Attendee, CalendarEvent, ConferenceData, EntryPoint, EventSet, ResponseStatus};
pub use links::{LinkKind, LinkSource, MeetingLink, MeetingLinkResolver, resolve_url};
pub use summary::{ellipsis, status_line, time_until};
pub use time::{EventTime, TimeWindow, start_of_day};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing, parse_level};
