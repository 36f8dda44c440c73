//! Engine configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Local};

/// Upstream fetch settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Non-forced refreshes within this interval of the last successful fetch
    /// are served from the cache.
    pub min_refresh_interval: Duration,
    /// Result horizon of a refresh listing.
    pub max_results: usize,
    /// Offset that defines "yesterday" and the per-day fetch windows.
    pub tz: FixedOffset,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(5),
            max_results: 50,
            tz: *Local::now().offset(),
        }
    }
}

impl FetchConfig {
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_tz(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }
}

/// Push channel and polling settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Local address of the webhook listener.
    pub listen: SocketAddr,
    /// Path notifications are POSTed to.
    pub path: String,
    /// Poll period while push is active.
    pub poll_interval: Duration,
    /// Poll period while degraded.
    pub fallback_poll_interval: Duration,
    /// Notifications closer together than this collapse into one refresh.
    pub debounce: Duration,
    /// Renew this long before the subscription expires.
    pub renewal_lead: Duration,
    /// Initial delay before re-registering a degraded channel.
    pub initial_retry: Duration,
    /// Maximum delay between re-registration attempts.
    pub max_retry: Duration,
    /// Backoff multiplier.
    pub retry_multiplier: f64,
    /// Where the active subscription is remembered across restarts.
    pub state_path: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 8085)),
            path: "/calendar-webhook".to_string(),
            poll_interval: Duration::from_secs(60),
            fallback_poll_interval: Duration::from_secs(30),
            debounce: Duration::from_millis(500),
            renewal_lead: Duration::from_secs(60),
            initial_retry: Duration::from_secs(30),
            max_retry: Duration::from_secs(30 * 60),
            retry_multiplier: 2.0,
            state_path: None,
        }
    }
}

impl ChannelConfig {
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Sets the webhook path. A leading `/` is added when missing.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn with_poll_intervals(mut self, active: Duration, fallback: Duration) -> Self {
        self.poll_interval = active;
        self.fallback_poll_interval = fallback;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_renewal_lead(mut self, lead: Duration) -> Self {
        self.renewal_lead = lead;
        self
    }

    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_retry = initial;
        self.max_retry = max;
        self.retry_multiplier = multiplier;
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Delay before re-registration attempt number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_retry.as_secs_f64();
        let multiplier = self.retry_multiplier.powi(attempt as i32 - 1);
        let max = self.max_retry.as_secs_f64();

        Duration::from_secs_f64((base * multiplier).min(max))
    }
}

/// Reminder decision thresholds.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Remind about an event that has not started this long before it starts.
    pub lead: chrono::Duration,
    /// While in a meeting, remind about the next one this long before it starts.
    pub next_lead: chrono::Duration,
    /// The next meeting is only considered when it starts within this window.
    pub next_window: chrono::Duration,
    /// An open reminder is closed once its event started this long ago.
    pub stale_after: chrono::Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead: chrono::Duration::seconds(60),
            next_lead: chrono::Duration::minutes(2),
            next_window: vivcal_core::summary::NEXT_EVENT_TAKEOVER,
            stale_after: chrono::Duration::minutes(5),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fetch: FetchConfig,
    pub channel: ChannelConfig,
    pub reminder: ReminderConfig,
    /// How often reminders are re-evaluated without new data.
    pub evaluate_interval: Duration,
    /// Where the last dismissal is remembered. `None` keeps it in memory.
    pub dismissal_path: Option<PathBuf>,
    /// Capacity of the command queue.
    pub command_capacity: usize,
    /// Capacity of the event broadcast.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            channel: ChannelConfig::default(),
            reminder: ReminderConfig::default(),
            evaluate_interval: Duration::from_secs(15),
            dismissal_path: None,
            command_capacity: 64,
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_reminder(mut self, reminder: ReminderConfig) -> Self {
        self.reminder = reminder;
        self
    }

    pub fn with_evaluate_interval(mut self, interval: Duration) -> Self {
        self.evaluate_interval = interval;
        self
    }

    pub fn with_dismissal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dismissal_path = Some(path.into());
        self
    }
}
