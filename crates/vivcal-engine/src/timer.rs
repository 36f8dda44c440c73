//! Cancellable timers.
//!
//! A timer delivers a message to the engine's command queue instead of
//! calling back into a component. Dropping the returned [`TaskHandle`]
//! cancels the timer, so replacing a stored handle is how a pending timer
//! gets rescheduled.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::warn;

/// Shortest period [`schedule_every`] accepts; tokio intervals reject zero.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Owns a spawned timer task and aborts it on drop.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Aborts the task. Equivalent to dropping the handle.
    pub fn cancel(self) {}

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Sends `message` once after `delay`.
pub fn schedule_once<T>(delay: Duration, tx: mpsc::Sender<T>, message: T) -> TaskHandle
where
    T: Send + 'static,
{
    TaskHandle::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(message).await;
    })
}

/// Sends `make()` every `period`, first after one full period.
///
/// Stops when the receiver is gone. Periods below [`MIN_PERIOD`] are raised
/// to it.
pub fn schedule_every<T, F>(period: Duration, tx: mpsc::Sender<T>, make: F) -> TaskHandle
where
    T: Send + 'static,
    F: Fn() -> T + Send + 'static,
{
    let period = if period < MIN_PERIOD {
        warn!(?period, "timer period too short, using {:?}", MIN_PERIOD);
        MIN_PERIOD
    } else {
        period
    };
    TaskHandle::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.send(make()).await.is_err() {
                break;
            }
        }
    })
}
