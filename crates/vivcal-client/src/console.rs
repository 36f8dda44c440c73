//! Terminal front end for a running engine.
//!
//! Engine events are printed as they arrive. Commands are read line by line
//! from stdin:
//!
//! ```text
//! dismiss <event-id>
//! snooze <event-id> <minutes>
//! refresh
//! day <YYYY-MM-DD>
//! status
//! quit
//! ```

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use vivcal_core::{EventSet, time_until};
use vivcal_engine::{
    ChannelState, ChannelStatus, EngineEvent, EngineHandle, EngineStatus, Reminder,
    ShutdownHandle,
};

const HELP: &str = "commands: dismiss <id> | snooze <id> <minutes> | refresh | day <YYYY-MM-DD> | status | quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Dismiss(String),
    Snooze(String, u32),
    Refresh,
    Day(NaiveDate),
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("dismiss", [id]) => Self::Dismiss(id.to_string()),
            ("snooze", [id, minutes]) => {
                let minutes = minutes
                    .parse::<u32>()
                    .ok()
                    .filter(|m| *m > 0)
                    .ok_or_else(|| format!("invalid minutes '{}'", minutes))?;
                Self::Snooze(id.to_string(), minutes)
            }
            ("refresh", []) => Self::Refresh,
            ("day", [day]) => Self::Day(
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map_err(|e| format!("invalid date '{}': {}", day, e))?,
            ),
            ("status", []) => Self::Status,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit" | "q", []) => Self::Quit,
            _ => return Err(format!("unrecognized command '{}'; {}", line.trim(), HELP)),
        };
        Ok(Some(command))
    }
}

/// Reads commands from `input` until EOF or `quit`.
pub async fn read_commands<R>(input: R, handle: EngineHandle, shutdown: ShutdownHandle)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console input closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to read console input");
                return;
            }
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };

        if command == ConsoleCommand::Quit {
            shutdown.trigger();
            return;
        }
        if let Err(e) = execute(&handle, command).await {
            println!("error: {}", e);
            return;
        }
    }
}

async fn execute(handle: &EngineHandle, command: ConsoleCommand) -> vivcal_engine::EngineResult<()> {
    match command {
        ConsoleCommand::Dismiss(id) => handle.dismiss(id).await?,
        ConsoleCommand::Snooze(id, minutes) => handle.snooze(id, minutes).await?,
        ConsoleCommand::Refresh => handle.refresh().await?,
        ConsoleCommand::Day(day) => {
            let events = handle.fetch_day(day).await?;
            println!("{}", format_day(day, &events, *Local::now().offset()));
        }
        ConsoleCommand::Status => {
            let status = handle.status().await?;
            println!("{}", format_status(&status));
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

/// Prints engine events until the engine goes away.
pub async fn print_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(text) = format_event(&event, Utc::now()) {
                    println!("{}", text);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "console fell behind engine events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// One line per event; `None` for events not worth printing.
pub fn format_event(event: &EngineEvent, now: DateTime<Utc>) -> Option<String> {
    match event {
        EngineEvent::Reminder(Some(reminder)) => Some(format_reminder(reminder, now)),
        EngineEvent::Reminder(None) => Some("reminder closed".to_string()),
        EngineEvent::EventsChanged(events) => Some(format!(
            "{} cached event(s); {}",
            events.len(),
            vivcal_core::status_line(&events.upcoming(now), now)
        )),
        EngineEvent::ChannelStatus(status) => Some(format_channel(status)),
        EngineEvent::AuthRequired(message) => Some(format!(
            "authentication required: {} (showing cached events)",
            message
        )),
    }
}

pub fn format_reminder(reminder: &Reminder, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "REMINDER [{}] {} {}",
        reminder.event_id,
        reminder.title,
        time_until(reminder.starts_at, now)
    );
    if reminder.upcoming_next {
        line.push_str(" (next meeting)");
    }
    if let Some(link) = &reminder.meeting_link {
        line.push_str(&format!("\n  join {}: {}", link.kind.display_name(), link.url));
    }
    line
}

/// Channel state with a degraded marker.
pub fn format_channel(status: &ChannelStatus) -> String {
    let state = match &status.state {
        ChannelState::Unregistered => "unregistered".to_string(),
        ChannelState::Registering => "registering".to_string(),
        ChannelState::Active => "push active".to_string(),
        ChannelState::Renewing => "renewing".to_string(),
        ChannelState::Degraded(reason) => format!("DEGRADED ({})", reason),
    };
    format!("channel: {}, polling every {}s", state, status.poll_interval_secs)
}

pub fn format_status(status: &EngineStatus) -> String {
    let mut lines = vec![status.status_line.clone(), format_channel(&status.channel)];
    if let Some(expiration) = status.channel.expiration {
        lines.push(format!("channel expires: {}", expiration.to_rfc3339()));
    }
    lines.push(format!("cached events: {}", status.cached_events));
    lines.push(format!(
        "last fetch: {}",
        status
            .last_fetch
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    ));
    if let Some(reminder) = &status.reminder {
        lines.push(format!("open reminder: [{}] {}", reminder.event_id, reminder.title));
    }
    if status.auth_required {
        lines.push("authentication required".to_string());
    }
    lines.join("\n")
}

/// Agenda for one day in `offset` local time.
pub fn format_day(day: NaiveDate, events: &EventSet, offset: FixedOffset) -> String {
    if events.is_empty() {
        return format!("{}: no events", day);
    }
    let mut lines = vec![format!("{}:", day)];
    for event in events.iter() {
        let when = if event.is_all_day() {
            "all day    ".to_string()
        } else {
            format!(
                "{}-{}",
                event.start_utc().with_timezone(&offset).format("%H:%M"),
                event.end_utc().with_timezone(&offset).format("%H:%M")
            )
        };
        lines.push(format!("  {} {} [{}]", when, event.title, event.id));
    }
    lines.join("\n")
}
