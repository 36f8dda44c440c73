//! Sync engine: fetch coordination, event cache, push channel, reminders.
//!
//! The [`Engine`] owns all mutable state and runs as a single task. Clients
//! drive it through an [`EngineHandle`] and observe it through broadcast
//! [`EngineEvent`]s.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vivcal_engine::{Engine, EngineConfig, EngineEvent};
//! # async fn run(upstream: Arc<dyn vivcal_providers::CalendarUpstream>) -> vivcal_engine::EngineResult<()> {
//! let engine = Engine::new(EngineConfig::default(), upstream);
//! let handle = engine.handle();
//! let mut events = handle.subscribe();
//! tokio::spawn(engine.run());
//!
//! while let Ok(event) = events.recv().await {
//!     if let EngineEvent::Reminder(Some(reminder)) = event {
//!         println!("{} starts at {}", reminder.title, reminder.starts_at);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod channel;
mod clock;
mod config;
mod dismissals;
mod engine;
mod error;
mod fetch;
mod reminder;
mod signals;
mod timer;
mod tunnel;
mod webhook;

#[cfg(test)]
mod testing;

pub use cache::{ChangeHash, EventCache, compute_change_hash, merge};
pub use channel::{ChannelState, ChannelStatus, ChannelSubscription, UpdateChannel};
pub use clock::{Clock, SystemClock};
pub use config::{ChannelConfig, EngineConfig, FetchConfig, ReminderConfig};
pub use dismissals::{DismissalStore, JsonFile};
pub use engine::{Engine, EngineCommand, EngineEvent, EngineHandle, EngineStatus};
pub use error::{EngineError, EngineResult};
pub use fetch::{FetchCoordinator, RefreshOutcome};
pub use reminder::{Reminder, ReminderEngine, ReminderUpdate};
pub use signals::ShutdownHandle;
pub use timer::{TaskHandle, schedule_every, schedule_once};
pub use tunnel::{CommandTunnel, StaticTunnel, Tunnel, TunnelSession};
pub use webhook::{WebhookServer, router};
