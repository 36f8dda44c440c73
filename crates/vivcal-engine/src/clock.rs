//! Wall clock access.
//!
//! Everything that compares against "now" (the refresh gate, reminder
//! windows, subscription expiry) reads it from a [`Clock`] so tests can pin
//! time. Timers themselves run on tokio's clock.

use chrono::{DateTime, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
