//! Reminder decisions.
//!
//! [`ReminderEngine::evaluate`] looks at the upcoming events (those that have
//! not ended, in start order) and decides whether a reminder should be shown,
//! kept, or closed.
//!
//! With `current` the first upcoming event and `next` the second:
//!
//! - while `current` is running, remind about `next` once it starts within
//!   [`ReminderConfig::next_lead`] (and within `next_window`)
//! - otherwise remind about `current` once it starts within
//!   [`ReminderConfig::lead`]
//!
//! A reminder is emitted once and stays open until it is dismissed, snoozed,
//! replaced by a reminder for another event, or its event started more than
//! [`ReminderConfig::stale_after`] ago.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use vivcal_core::{CalendarEvent, EventSet, MeetingLink, MeetingLinkResolver};

use crate::config::ReminderConfig;
use crate::dismissals::DismissalStore;
use crate::engine::EngineCommand;
use crate::timer::{TaskHandle, schedule_once};

/// A reminder for the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub event_id: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub meeting_link: Option<MeetingLink>,
    /// Whether this is the meeting after the one in progress.
    pub upcoming_next: bool,
}

/// What the display layer should do after an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderUpdate {
    Show(Reminder),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snooze {
    event_id: String,
    until: DateTime<Utc>,
}

/// Reminder state machine.
pub struct ReminderEngine {
    config: ReminderConfig,
    resolver: MeetingLinkResolver,
    dismissals: DismissalStore,
    snooze: Option<Snooze>,
    open: Option<Reminder>,
    snooze_timer: Option<TaskHandle>,
    commands: mpsc::Sender<EngineCommand>,
}

impl ReminderEngine {
    pub fn new(
        config: ReminderConfig,
        dismissals: DismissalStore,
        commands: mpsc::Sender<EngineCommand>,
    ) -> Self {
        Self {
            config,
            resolver: MeetingLinkResolver::new(),
            dismissals,
            snooze: None,
            open: None,
            snooze_timer: None,
            commands,
        }
    }

    /// The currently open reminder.
    pub fn open_reminder(&self) -> Option<&Reminder> {
        self.open.as_ref()
    }

    pub fn evaluate(&mut self, upcoming: &EventSet, now: DateTime<Utc>) -> Option<ReminderUpdate> {
        let Some(current) = upcoming.first() else {
            return self.close();
        };

        if let Some((target, upcoming_next)) = self.target(current, upcoming, now)
            && !self.is_suppressed(&target.id, now)
        {
            if self.open.as_ref().is_some_and(|r| r.event_id == target.id) {
                return None;
            }
            let reminder = Reminder {
                event_id: target.id.clone(),
                title: target.title.clone(),
                starts_at: target.start_utc(),
                meeting_link: self.resolver.resolve(target),
                upcoming_next,
            };
            info!(event_id = %reminder.event_id, title = %reminder.title, "showing reminder");
            self.open = Some(reminder.clone());
            return Some(ReminderUpdate::Show(reminder));
        }

        let stale = self
            .open
            .as_ref()
            .is_some_and(|r| now - r.starts_at >= self.config.stale_after);
        if stale {
            debug!("closing stale reminder");
            return self.close();
        }
        None
    }

    fn target<'a>(
        &self,
        current: &'a CalendarEvent,
        upcoming: &'a EventSet,
        now: DateTime<Utc>,
    ) -> Option<(&'a CalendarEvent, bool)> {
        let in_current = current.is_ongoing_at(now);

        if in_current {
            let next = upcoming.iter().nth(1)?;
            let until_next = next.starts_in(now);
            return (until_next <= self.config.next_window && until_next <= self.config.next_lead)
                .then_some((next, true));
        }

        (current.starts_in(now) <= self.config.lead).then_some((current, false))
    }

    /// Dismissed, or snoozed with the deadline still ahead.
    pub fn is_suppressed(&self, event_id: &str, now: DateTime<Utc>) -> bool {
        self.dismissals.is_dismissed(event_id)
            || self
                .snooze
                .as_ref()
                .is_some_and(|s| s.event_id == event_id && now < s.until)
    }

    /// Records the dismissal and closes the reminder if it is for `event_id`.
    pub fn dismiss(&mut self, event_id: &str) -> Option<ReminderUpdate> {
        info!(event_id = %event_id, "reminder dismissed");
        self.dismissals.dismiss(event_id);
        if self.open.as_ref().is_some_and(|r| r.event_id == event_id) {
            return self.close();
        }
        None
    }

    /// Hides `event_id` for `minutes` and re-evaluates afterwards.
    ///
    /// An earlier dismissal stays in place.
    pub fn snooze(&mut self, event_id: &str, minutes: u32, now: DateTime<Utc>) -> Option<ReminderUpdate> {
        info!(event_id = %event_id, minutes, "reminder snoozed");
        self.snooze = Some(Snooze {
            event_id: event_id.to_string(),
            until: now + chrono::Duration::minutes(i64::from(minutes)),
        });
        self.snooze_timer = Some(schedule_once(
            Duration::from_secs(u64::from(minutes) * 60),
            self.commands.clone(),
            EngineCommand::Evaluate,
        ));
        self.close()
    }

    /// Cancels the snooze timer.
    pub fn cancel_timers(&mut self) {
        self.snooze_timer = None;
    }

    fn close(&mut self) -> Option<ReminderUpdate> {
        self.open.take().map(|r| {
            debug!(event_id = %r.event_id, "closing reminder");
            ReminderUpdate::Close
        })
    }
}
