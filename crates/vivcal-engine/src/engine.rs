//! The engine task.
//!
//! One task owns the [`FetchCoordinator`], the [`UpdateChannel`] and the
//! [`ReminderEngine`] and processes [`EngineCommand`]s one at a time. Timers,
//! the webhook listener and the display layer only ever talk to it through
//! the command queue; results go out on a broadcast channel of
//! [`EngineEvent`]s.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use vivcal_core::{EventSet, status_line};
use vivcal_providers::CalendarUpstream;

use crate::channel::{ChannelStatus, UpdateChannel};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::dismissals::DismissalStore;
use crate::error::{EngineError, EngineResult};
use crate::fetch::FetchCoordinator;
use crate::reminder::{Reminder, ReminderEngine, ReminderUpdate};
use crate::timer::{TaskHandle, schedule_every};
use crate::tunnel::Tunnel;
use crate::webhook::WebhookServer;

/// Messages processed by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Refresh from upstream; `force` bypasses the rate limit gate.
    Refresh { force: bool },
    /// A push notification arrived.
    Notified,
    /// Re-run the reminder decision.
    Evaluate,
    /// The subscription is about to expire.
    RenewChannel,
    /// Try to leave the degraded state.
    RetryChannel,
    /// The tunnel went away.
    TransportLost { reason: String },
    /// The webhook listener stopped.
    ListenerFailed { reason: String },
    /// Fetch one local day and prefetch the next.
    FetchDay {
        day: NaiveDate,
        reply: oneshot::Sender<EngineResult<EventSet>>,
    },
    Dismiss { event_id: String },
    Snooze { event_id: String, minutes: u32 },
    Status { reply: oneshot::Sender<EngineStatus> },
    Shutdown,
}

/// Broadcast to the display layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// `None` closes the reminder.
    Reminder(Option<Reminder>),
    EventsChanged(EventSet),
    ChannelStatus(ChannelStatus),
    /// Credentials were rejected; cached data is still served.
    AuthRequired(String),
}

/// Answer to [`EngineHandle::status`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub channel: ChannelStatus,
    pub cached_events: usize,
    pub last_fetch: Option<DateTime<Utc>>,
    pub reminder: Option<Reminder>,
    pub auth_required: bool,
    pub status_line: String,
}

/// Cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Forces a refresh.
    pub async fn refresh(&self) -> EngineResult<()> {
        self.send(EngineCommand::Refresh { force: true }).await
    }

    pub async fn dismiss(&self, event_id: impl Into<String>) -> EngineResult<()> {
        self.send(EngineCommand::Dismiss {
            event_id: event_id.into(),
        })
        .await
    }

    pub async fn snooze(&self, event_id: impl Into<String>, minutes: u32) -> EngineResult<()> {
        self.send(EngineCommand::Snooze {
            event_id: event_id.into(),
            minutes,
        })
        .await
    }

    /// Events overlapping `day`, fetched on demand.
    pub async fn fetch_day(&self, day: NaiveDate) -> EngineResult<EventSet> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::FetchDay { day, reply }).await?;
        rx.await.map_err(|_| EngineError::ShutDown)?
    }

    pub async fn status(&self) -> EngineResult<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ShutDown)
    }

    pub async fn shutdown(&self) -> EngineResult<()> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, command: EngineCommand) -> EngineResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::ShutDown)
    }
}

/// The sync and reminder engine.
pub struct Engine {
    config: EngineConfig,
    upstream: Arc<dyn CalendarUpstream>,
    tunnel: Option<Arc<dyn Tunnel>>,
    clock: Arc<dyn Clock>,
    command_tx: mpsc::Sender<EngineCommand>,
    command_rx: mpsc::Receiver<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(config: EngineConfig, upstream: Arc<dyn CalendarUpstream>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            config,
            upstream,
            tunnel: None,
            clock: Arc::new(SystemClock),
            command_tx,
            command_rx,
            events,
        }
    }

    /// Enables push notifications through `tunnel`. Without one the engine
    /// only polls.
    pub fn with_tunnel(mut self, tunnel: Arc<dyn Tunnel>) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.command_tx.clone(),
            events: self.events.clone(),
        }
    }

    /// Runs until [`EngineHandle::shutdown`].
    ///
    /// Startup: webhook listener, forced refresh, first evaluation, channel
    /// registration. Shutdown: timers, subscription, listener.
    pub async fn run(self) -> EngineResult<()> {
        let Engine {
            config,
            upstream,
            tunnel,
            clock,
            command_tx,
            mut command_rx,
            events,
        } = self;

        let fetch = FetchCoordinator::new(upstream.clone(), clock.clone(), config.fetch.clone());
        let channel = UpdateChannel::new(
            upstream,
            tunnel,
            clock.clone(),
            config.channel.clone(),
            command_tx.clone(),
        );
        let reminders = ReminderEngine::new(
            config.reminder.clone(),
            DismissalStore::open(config.dismissal_path.clone()),
            command_tx.clone(),
        );

        let mut state = EngineState {
            clock,
            fetch,
            channel,
            reminders,
            events,
            auth_required: false,
        };

        info!("engine starting");
        let webhook = match WebhookServer::bind(
            config.channel.listen,
            &config.channel.path,
            command_tx.clone(),
        )
        .await
        {
            Ok(server) => Some(server),
            Err(e) => {
                warn!(error = %e, "webhook listener unavailable");
                state.channel.listener_failed(e.to_string());
                None
            }
        };

        state.refresh(true).await;
        state.channel.start().await;
        state.publish_channel_status();

        let evaluate_timer = schedule_every(config.evaluate_interval, command_tx.clone(), || {
            EngineCommand::Evaluate
        });
        drop(command_tx);

        while let Some(command) = command_rx.recv().await {
            if !state.handle(command).await {
                break;
            }
        }

        info!("engine shutting down");
        drop(evaluate_timer);
        state.reminders.cancel_timers();
        state.channel.teardown().await;
        if let Some(server) = webhook {
            server.stop().await;
        }
        info!("engine stopped");
        Ok(())
    }
}

struct EngineState {
    clock: Arc<dyn Clock>,
    fetch: FetchCoordinator,
    channel: UpdateChannel,
    reminders: ReminderEngine,
    events: broadcast::Sender<EngineEvent>,
    auth_required: bool,
}

impl EngineState {
    /// Returns false when the engine should stop.
    async fn handle(&mut self, command: EngineCommand) -> bool {
        let before = self.channel.status();

        match command {
            EngineCommand::Refresh { force } => self.refresh(force).await,
            EngineCommand::Notified => self.channel.notified(),
            EngineCommand::Evaluate => self.evaluate(),
            EngineCommand::RenewChannel => self.channel.renew().await,
            EngineCommand::RetryChannel => self.channel.retry().await,
            EngineCommand::TransportLost { reason } => self.channel.transport_lost(reason),
            EngineCommand::ListenerFailed { reason } => self.channel.listener_failed(reason),
            EngineCommand::FetchDay { day, reply } => self.fetch_day(day, reply),
            EngineCommand::Dismiss { event_id } => {
                let update = self.reminders.dismiss(&event_id);
                self.publish_reminder(update);
            }
            EngineCommand::Snooze { event_id, minutes } => {
                let update = self.reminders.snooze(&event_id, minutes, self.clock.now());
                self.publish_reminder(update);
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status().await);
            }
            EngineCommand::Shutdown => return false,
        }

        if self.channel.status() != before {
            self.publish_channel_status();
        }
        true
    }

    async fn refresh(&mut self, force: bool) {
        match self.fetch.refresh(force).await {
            Ok(outcome) => {
                self.auth_required = false;
                if outcome.changed {
                    self.publish(EngineEvent::EventsChanged(outcome.events));
                }
            }
            Err(EngineError::AuthenticationRequired { message }) => {
                error!(error = %message, "authentication required");
                self.auth_required = true;
                self.publish(EngineEvent::AuthRequired(message));
            }
            Err(e) => warn!(error = %e, "refresh failed"),
        }
        self.evaluate();
    }

    fn evaluate(&mut self) {
        let now = self.clock.now();
        let upcoming = self.fetch.cached().upcoming(now);
        let update = self.reminders.evaluate(&upcoming, now);
        self.publish_reminder(update);
    }

    /// Runs the range fetch off the engine task so it never blocks commands.
    fn fetch_day(&self, day: NaiveDate, reply: oneshot::Sender<EngineResult<EventSet>>) {
        let fetch = self.fetch.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let before = fetch.cached();
            let result = fetch.fetch_range(day).await;
            let after = fetch.cached();
            if after != before {
                let _ = events.send(EngineEvent::EventsChanged(after));
            }
            let _ = reply.send(result);
        });
    }

    async fn status(&self) -> EngineStatus {
        let now = self.clock.now();
        let cached = self.fetch.cached();
        EngineStatus {
            channel: self.channel.status(),
            cached_events: cached.len(),
            last_fetch: self.fetch.last_fetch().await,
            reminder: self.reminders.open_reminder().cloned(),
            auth_required: self.auth_required,
            status_line: status_line(&cached.upcoming(now), now),
        }
    }

    fn publish_reminder(&self, update: Option<ReminderUpdate>) {
        match update {
            Some(ReminderUpdate::Show(reminder)) => self.publish(EngineEvent::Reminder(Some(reminder))),
            Some(ReminderUpdate::Close) => self.publish(EngineEvent::Reminder(None)),
            None => {}
        }
    }

    fn publish_channel_status(&self) {
        self.publish(EngineEvent::ChannelStatus(self.channel.status()));
    }

    fn publish(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("no engine event subscribers");
        }
    }
}
