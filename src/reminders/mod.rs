//! Reminder Scheduler
//!
//! Derives a checkpoint ladder from a session's total duration and spawns
//! one-shot timers for the reminders and the final deadline. There is no
//! cancellable-timer primitive: every timer re-reads the session registry
//! at fire time and delivers nothing when its session has been aborted,
//! superseded, or already ended.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::occurrences::{Occurrence, TimerFire};
use crate::registry::{SessionRegistry, SessionSlot, SessionToken};
use crate::session::SessionInput;

/// Fixed descending ladder of remaining-duration checkpoints.
pub const CHECKPOINTS: [Duration; 14] = [
    Duration::from_secs(7 * 86_400),
    Duration::from_secs(3 * 86_400),
    Duration::from_secs(2 * 86_400),
    Duration::from_secs(86_400),
    Duration::from_secs(12 * 3_600),
    Duration::from_secs(6 * 3_600),
    Duration::from_secs(3 * 3_600),
    Duration::from_secs(3_600),
    Duration::from_secs(30 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(2 * 60),
    Duration::from_secs(30),
    Duration::from_secs(10),
];

/// Payload carried by a reminder timer fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Time left on the session clock when this reminder fires.
    pub remaining: Duration,
}

/// A planned one-shot timer: fire at `fire_after` elapsed session time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedReminder {
    pub fire_after: Duration,
    pub reminder: Reminder,
}

/// Reminders for a total duration `D`: one per checkpoint `C` with
/// `D >= 2*C`, firing at elapsed `D - C`. A 5-minute vote gets reminders
/// at the 2m, 30s and 10s marks; a 10-second vote gets none.
pub fn plan(total: Duration) -> Vec<PlannedReminder> {
    CHECKPOINTS
        .iter()
        .filter(|&&checkpoint| total >= checkpoint * 2)
        .map(|&checkpoint| PlannedReminder {
            fire_after: total - checkpoint,
            reminder: Reminder {
                remaining: checkpoint,
            },
        })
        .collect()
}

/// Render a remaining duration with the coarsest unit that evenly divides
/// it: days, then hours, then minutes, else raw seconds.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    let (value, unit) = if secs > 0 && secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs > 0 && secs % 3_600 == 0 {
        (secs / 3_600, "hour")
    } else if secs > 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if value == 1 {
        format!("{} {}", value, unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// The reminder line for a channel: remaining time plus all live choices.
pub fn render_reminder(remaining: Duration, display_names: &[&str]) -> String {
    format!(
        "*{}* left to vote! Cast your vote for one of: {}",
        format_remaining(remaining),
        display_names.join(", ")
    )
}

/// Spawn the reminder timers and the final deadline timer for a session.
///
/// Each timer sleeps on its own task, racing engine shutdown. At fire time
/// it re-reads the registry: reminders deliver only while the slot is still
/// `Active` with this session's token; the deadline also delivers on
/// `EndingEarly`, so the session wakes to report even if the early-end
/// nudge raced it.
pub fn spawn_timers(
    total: Duration,
    channel: &str,
    token: SessionToken,
    registry: Arc<SessionRegistry>,
    queue: UnboundedSender<SessionInput>,
    shutdown: CancellationToken,
) {
    for planned in plan(total) {
        spawn_one(
            planned.fire_after,
            Some(planned.reminder),
            channel.to_string(),
            token,
            registry.clone(),
            queue.clone(),
            shutdown.clone(),
        );
    }
    spawn_one(
        total,
        None,
        channel.to_string(),
        token,
        registry.clone(),
        queue,
        shutdown,
    );
}

fn spawn_one(
    fire_after: Duration,
    reminder: Option<Reminder>,
    channel: String,
    token: SessionToken,
    registry: Arc<SessionRegistry>,
    queue: UnboundedSender<SessionInput>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(fire_after) => {}
        }

        let deliver = match registry.lookup(&channel) {
            Some(SessionSlot::Active(current)) => current == token,
            Some(SessionSlot::EndingEarly) => reminder.is_none(),
            None => false,
        };
        if !deliver {
            debug!(%channel, %token, "stale timer fire; dropping");
            return;
        }

        // The session may have just terminated; a closed queue is fine.
        let _ = queue.send(SessionInput::Occurrence(Occurrence::Timer(TimerFire {
            channel,
            token,
            reminder,
        })));
    });
}
