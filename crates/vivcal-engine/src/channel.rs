//! Push channel lifecycle and polling fallback.
//!
//! ```text
//! Unregistered ──start──▶ Registering ──ok──▶ Active ──renewal──▶ Renewing ──ok──▶ Active
//!                              │                 │                    │
//!                              └──fail──▶ Degraded ◀──transport lost──┴──fail
//!                                           │  ▲
//!                                           └──┘ retry with backoff
//! ```
//!
//! Polling never stops: it runs at the normal interval while push is active
//! and at the fallback interval otherwise. Push notifications and poll ticks
//! both end up as [`EngineCommand::Refresh`].
//!
//! Every timer is a [`TaskHandle`] stored here, so teardown is dropping them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vivcal_providers::{CalendarUpstream, Subscription};

use crate::clock::Clock;
use crate::config::ChannelConfig;
use crate::dismissals::JsonFile;
use crate::engine::EngineCommand;
use crate::timer::{TaskHandle, schedule_every, schedule_once};
use crate::tunnel::Tunnel;

/// Lifecycle state of the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ChannelState {
    Unregistered,
    Registering,
    Active,
    Renewing,
    /// Push is unavailable; polling at the fallback interval.
    Degraded(String),
}

impl ChannelState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A subscription plus the instant it should be renewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscription {
    pub subscription: Subscription,
    pub renew_at: DateTime<Utc>,
}

impl ChannelSubscription {
    pub fn new(subscription: Subscription, renewal_lead: Duration) -> Self {
        let lead = chrono::Duration::from_std(renewal_lead).unwrap_or(chrono::Duration::zero());
        let renew_at = subscription.expiration - lead;
        Self {
            subscription,
            renew_at,
        }
    }
}

/// Snapshot for the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub channel_id: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
    pub poll_interval_secs: u64,
}

/// On-disk form of the last subscription.
#[derive(Debug, Serialize, Deserialize)]
struct SavedChannel {
    channel_id: String,
    resource_id: Option<String>,
    expiration: DateTime<Utc>,
}

impl From<&Subscription> for SavedChannel {
    fn from(sub: &Subscription) -> Self {
        Self {
            channel_id: sub.channel_id.clone(),
            resource_id: sub.resource_id.clone(),
            expiration: sub.expiration,
        }
    }
}

impl From<SavedChannel> for Subscription {
    fn from(saved: SavedChannel) -> Self {
        Self {
            channel_id: saved.channel_id,
            resource_id: saved.resource_id,
            expiration: saved.expiration,
        }
    }
}

/// Owns the push subscription and every channel timer.
pub struct UpdateChannel {
    upstream: Arc<dyn CalendarUpstream>,
    tunnel: Option<Arc<dyn Tunnel>>,
    clock: Arc<dyn Clock>,
    config: ChannelConfig,
    commands: mpsc::Sender<EngineCommand>,
    saved: JsonFile<SavedChannel>,

    state: ChannelState,
    /// Last registered subscription. Survives degradation so that the next
    /// `register` or `teardown` can still release it upstream.
    subscription: Option<ChannelSubscription>,
    public_url: Option<String>,
    listener_down: Option<String>,
    retry_attempts: u32,
    poll_interval: Option<Duration>,

    poll_timer: Option<TaskHandle>,
    renewal_timer: Option<TaskHandle>,
    debounce_timer: Option<TaskHandle>,
    retry_timer: Option<TaskHandle>,
    tunnel_watch: Option<TaskHandle>,
}

impl UpdateChannel {
    pub fn new(
        upstream: Arc<dyn CalendarUpstream>,
        tunnel: Option<Arc<dyn Tunnel>>,
        clock: Arc<dyn Clock>,
        config: ChannelConfig,
        commands: mpsc::Sender<EngineCommand>,
    ) -> Self {
        let saved = JsonFile::new(config.state_path.clone());
        Self {
            upstream,
            tunnel,
            clock,
            config,
            commands,
            saved,
            state: ChannelState::Unregistered,
            subscription: None,
            public_url: None,
            listener_down: None,
            retry_attempts: 0,
            poll_interval: None,
            poll_timer: None,
            renewal_timer: None,
            debounce_timer: None,
            retry_timer: None,
            tunnel_watch: None,
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn subscription(&self) -> Option<&ChannelSubscription> {
        self.subscription.as_ref()
    }

    /// Snapshot for status reports. A degraded channel reports no
    /// subscription even while one is held for release.
    pub fn status(&self) -> ChannelStatus {
        let live = match self.state {
            ChannelState::Degraded(_) => None,
            _ => self.subscription.as_ref(),
        };
        ChannelStatus {
            state: self.state.clone(),
            channel_id: live.map(|s| s.subscription.channel_id.clone()),
            expiration: live.map(|s| s.subscription.expiration),
            poll_interval_secs: self.poll_interval.map_or(0, |d| d.as_secs()),
        }
    }

    /// Starts polling, releases a channel left over from a previous run, and
    /// registers.
    pub async fn start(&mut self) {
        self.set_poll_interval(self.config.poll_interval);
        self.release_saved().await;
        self.register().await;
    }

    /// Marks push as impossible because the webhook listener is not running.
    pub fn listener_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.listener_down = Some(reason.clone());
        self.degrade(reason);
    }

    /// Registers a brand-new subscription, replacing any current one.
    pub async fn register(&mut self) {
        self.retry_timer = None;

        if let Some(reason) = self.listener_down.clone() {
            self.degrade(reason);
            return;
        }
        let Some(tunnel) = self.tunnel.clone() else {
            self.degrade("no tunnel configured");
            return;
        };

        self.state = if self.state.is_active() {
            ChannelState::Renewing
        } else {
            ChannelState::Registering
        };

        let public_url = match self.public_url.clone() {
            Some(url) => url,
            None => match tunnel.open().await {
                Ok(session) => {
                    let commands = self.commands.clone();
                    let closed = session.closed;
                    self.tunnel_watch = Some(TaskHandle::spawn(async move {
                        let reason = closed.await;
                        let _ = commands.send(EngineCommand::TransportLost { reason }).await;
                    }));
                    self.public_url = Some(session.public_url.clone());
                    session.public_url
                }
                Err(e) => {
                    self.degrade(format!("tunnel unavailable: {}", e));
                    return;
                }
            },
        };

        let callback = format!("{}{}", public_url.trim_end_matches('/'), self.config.path);
        let channel_id = Uuid::new_v4().to_string();

        let subscription = match self.upstream.subscribe(&channel_id, &callback).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.degrade(format!("registration failed: {}", e));
                return;
            }
        };

        let channel = ChannelSubscription::new(subscription, self.config.renewal_lead);
        let delay = (channel.renew_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.renewal_timer = Some(schedule_once(
            delay,
            self.commands.clone(),
            EngineCommand::RenewChannel,
        ));
        self.saved.save(&SavedChannel::from(&channel.subscription));

        info!(
            channel_id = %channel.subscription.channel_id,
            callback = %callback,
            expiration = %channel.subscription.expiration,
            "push channel active"
        );

        if let Some(previous) = self.subscription.replace(channel) {
            self.release(&previous.subscription).await;
        }
        self.state = ChannelState::Active;
        self.retry_attempts = 0;
        self.set_poll_interval(self.config.poll_interval);
    }

    /// Renewal timer fired.
    pub async fn renew(&mut self) {
        if self.state.is_active() {
            debug!("renewing push channel");
            self.register().await;
        }
    }

    /// Retry timer fired.
    pub async fn retry(&mut self) {
        if matches!(self.state, ChannelState::Degraded(_)) {
            debug!(attempt = self.retry_attempts, "retrying push channel registration");
            self.register().await;
        }
    }

    /// The tunnel closed or the listener died.
    pub fn transport_lost(&mut self, reason: impl Into<String>) {
        self.tunnel_watch = None;
        self.public_url = None;
        self.renewal_timer = None;
        self.degrade(reason);
    }

    /// A push notification arrived. Replaces any pending debounced refresh.
    pub fn notified(&mut self) {
        debug!("debouncing push notification");
        self.debounce_timer = Some(schedule_once(
            self.config.debounce,
            self.commands.clone(),
            EngineCommand::Refresh { force: false },
        ));
    }

    /// Cancels every timer and releases the subscription if it is still live.
    pub async fn teardown(&mut self) {
        self.poll_timer = None;
        self.renewal_timer = None;
        self.debounce_timer = None;
        self.retry_timer = None;
        self.tunnel_watch = None;
        self.poll_interval = None;

        if let Some(channel) = self.subscription.take() {
            self.release(&channel.subscription).await;
        }
        self.saved.remove();
        self.public_url = None;
        self.state = ChannelState::Unregistered;
        info!("push channel torn down");
    }

    fn degrade(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "push channel degraded, polling");
        self.state = ChannelState::Degraded(reason);
        self.set_poll_interval(self.config.fallback_poll_interval);

        if let Err(e) = self.commands.try_send(EngineCommand::Refresh { force: false }) {
            warn!(error = %e, "could not queue fallback refresh");
        }

        if self.tunnel.is_some() && self.listener_down.is_none() {
            self.retry_attempts = self.retry_attempts.saturating_add(1);
            let delay = self.config.retry_delay(self.retry_attempts);
            debug!(attempt = self.retry_attempts, delay_secs = delay.as_secs(), "scheduling channel retry");
            self.retry_timer = Some(schedule_once(
                delay,
                self.commands.clone(),
                EngineCommand::RetryChannel,
            ));
        }
    }

    fn set_poll_interval(&mut self, interval: Duration) {
        if self.poll_interval == Some(interval) && self.poll_timer.is_some() {
            return;
        }
        debug!(interval_secs = interval.as_secs(), "polling");
        self.poll_interval = Some(interval);
        self.poll_timer = Some(schedule_every(interval, self.commands.clone(), || {
            EngineCommand::Refresh { force: false }
        }));
    }

    /// Unsubscribes unless already expired. Failures are logged only.
    async fn release(&self, subscription: &Subscription) {
        if subscription.is_expired_at(self.clock.now()) {
            debug!(channel_id = %subscription.channel_id, "subscription already expired");
            return;
        }
        match self.upstream.unsubscribe(subscription).await {
            Ok(()) => info!(channel_id = %subscription.channel_id, "push channel stopped"),
            Err(e) => warn!(channel_id = %subscription.channel_id, error = %e, "failed to stop push channel"),
        }
    }

    async fn release_saved(&mut self) {
        if let Some(saved) = self.saved.load() {
            let subscription = Subscription::from(saved);
            debug!(channel_id = %subscription.channel_id, "releasing channel from previous run");
            self.release(&subscription).await;
            self.saved.remove();
        }
    }
}
