//! Restart countdown: deterministic warning checkpoints and the ticking task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Internal;

/// Warning text for a given number of remaining seconds.
///
/// Checkpoints: 1h, 30m, 15m, 10m, 5m, 1m, 30s, every second at 10s and
/// below, and "now" at zero. Any other value emits nothing. Purely a
/// function of the remaining time, so countdown announcements can be
/// tested without a clock.
pub fn warning_for(remaining_secs: u64) -> Option<String> {
    let phrase = match remaining_secs {
        0 => return Some("Restarting now.".to_owned()),
        1 => "1 second".to_owned(),
        2..=10 => format!("{remaining_secs} seconds"),
        30 => "30 seconds".to_owned(),
        60 => "1 minute".to_owned(),
        300 => "5 minutes".to_owned(),
        600 => "10 minutes".to_owned(),
        900 => "15 minutes".to_owned(),
        1800 => "30 minutes".to_owned(),
        3600 => "1 hour".to_owned(),
        _ => return None,
    };
    Some(format!("Automatic restart in {phrase}."))
}

/// A running countdown task, cancellable at any point.
///
/// Cancel is idempotent and safe after completion. Every message the task
/// emits carries its generation so the supervisor can discard events from
/// a countdown it has already replaced.
#[derive(Debug)]
pub(crate) struct Countdown {
    generation: u64,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a countdown of `seconds`, reporting into the supervisor's
    /// internal channel.
    pub(crate) fn spawn(generation: u64, seconds: u64, tx: mpsc::Sender<Internal>) -> Self {
        let task = tokio::spawn(async move {
            let mut remaining = seconds;
            loop {
                if let Some(text) = warning_for(remaining) {
                    let _ = tx.send(Internal::CountdownWarning { generation, text }).await;
                }
                if remaining == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining = remaining.saturating_sub(1);
            }
            let _ = tx.send(Internal::CountdownExpired { generation }).await;
        });
        Self { generation, task }
    }

    /// Generation tag carried by this countdown's messages.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop ticking. No further warnings or expiry fire after this returns.
    pub(crate) fn cancel(&self) {
        self.task.abort();
    }
}
