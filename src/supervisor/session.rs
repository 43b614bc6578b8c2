//! Pure state machine for the supervised server session.
//!
//! All transitions take injected timestamps, so crash-window accounting is
//! testable without wall-clock waits. The session record is owned and
//! mutated exclusively by the supervisor actor.

use chrono::{DateTime, TimeDelta, Utc};

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process is not running and no start has been issued.
    Offline,
    /// Start issued, liveness not yet confirmed.
    Starting,
    /// Liveness confirmed.
    Running,
    /// Stop issued, still waiting for the process to exit.
    Stopping,
    /// Crash-loop threshold reached; starts are refused until unlocked.
    CrashLocked,
}

impl SessionState {
    /// Short human-readable state name for command replies.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::CrashLocked => "crash-locked",
        }
    }
}

/// Non-fatal rejection of a command issued in an incompatible state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateRejection {
    /// Start requested while not offline.
    #[error("server is not offline (currently {current})")]
    AlreadyRunning {
        /// Current state name.
        current: &'static str,
    },
    /// Start requested while the crash lock is active.
    #[error("crash lock is active; unlock before starting")]
    CrashLockActive,
    /// Stop (or restart) requested while not running.
    #[error("server is not running (currently {current})")]
    NotRunning {
        /// Current state name.
        current: &'static str,
    },
    /// Unlock requested with no active crash lock.
    #[error("crash lock is not active")]
    NotLocked,
}

/// Outcome of recording an unexpected process death.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashOutcome {
    /// Below the threshold; the process should be relaunched.
    Relaunch {
        /// Consecutive crashes within the rolling window, this one included.
        count: u32,
    },
    /// Threshold reached; the session is now crash-locked.
    Locked,
}

/// The supervised server session record.
#[derive(Debug)]
pub struct ServerSession {
    state: SessionState,
    crash_count: u32,
    last_crash_at: Option<DateTime<Utc>>,
    pending_restart_secs: u64,
    skip_count: u32,
    restart_locked: bool,
}

impl ServerSession {
    /// Create a session, inferring the initial state from an external
    /// process inspection performed at supervisor startup.
    pub fn new(initially_running: bool) -> Self {
        Self {
            state: if initially_running {
                SessionState::Running
            } else {
                SessionState::Offline
            },
            crash_count: 0,
            last_crash_at: None,
            pending_restart_secs: 0,
            skip_count: 0,
            restart_locked: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether liveness is currently confirmed.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Consecutive crashes recorded within the rolling window.
    pub fn crash_count(&self) -> u32 {
        self.crash_count
    }

    /// Seconds the active countdown was armed with (0 = none).
    pub fn pending_restart_secs(&self) -> u64 {
        self.pending_restart_secs
    }

    /// Record that a countdown was armed for `secs` (or cleared with 0).
    pub fn set_pending_restart_secs(&mut self, secs: u64) {
        self.pending_restart_secs = secs;
    }

    /// Scheduled restarts still to be skipped.
    pub fn skip_count(&self) -> u32 {
        self.skip_count
    }

    /// Replace the skip counter.
    pub fn set_skip_count(&mut self, count: u32) {
        self.skip_count = count;
    }

    /// Consume one pending skip. Returns `true` when one was available.
    pub fn consume_skip(&mut self) -> bool {
        if self.skip_count == 0 {
            return false;
        }
        self.skip_count = self.skip_count.saturating_sub(1);
        true
    }

    /// Whether a restart sequence currently owns the session.
    pub fn restart_locked(&self) -> bool {
        self.restart_locked
    }

    /// Set or clear the restart lock.
    pub fn set_restart_locked(&mut self, locked: bool) {
        self.restart_locked = locked;
    }

    /// Begin startup: `Offline -> Starting`.
    ///
    /// # Errors
    ///
    /// Rejected while crash-locked or in any non-offline state.
    pub fn begin_startup(&mut self) -> Result<(), StateRejection> {
        match self.state {
            SessionState::CrashLocked => Err(StateRejection::CrashLockActive),
            SessionState::Offline => {
                self.state = SessionState::Starting;
                Ok(())
            }
            other => Err(StateRejection::AlreadyRunning {
                current: other.describe(),
            }),
        }
    }

    /// Roll back a startup whose launch command failed to issue.
    pub fn abort_startup(&mut self) {
        if self.state == SessionState::Starting {
            self.state = SessionState::Offline;
        }
    }

    /// Liveness confirmed: `Starting -> Running`.
    pub fn confirm_started(&mut self) {
        if self.state == SessionState::Starting {
            self.state = SessionState::Running;
        }
    }

    /// Begin clean shutdown: `Running -> Stopping`.
    ///
    /// # Errors
    ///
    /// Rejected in any state other than `Running`.
    pub fn begin_shutdown(&mut self) -> Result<(), StateRejection> {
        match self.state {
            SessionState::Running => {
                self.state = SessionState::Stopping;
                Ok(())
            }
            other => Err(StateRejection::NotRunning {
                current: other.describe(),
            }),
        }
    }

    /// Roll back a shutdown whose stop command failed to issue.
    pub fn abort_shutdown(&mut self) {
        if self.state == SessionState::Stopping {
            self.state = SessionState::Running;
        }
    }

    /// Expected process exit observed: `Stopping -> Offline`.
    pub fn confirm_stopped(&mut self) {
        if self.state == SessionState::Stopping {
            self.state = SessionState::Offline;
        }
    }

    /// Record an unexpected process death observed while `Running`.
    ///
    /// Increments the crash counter when the previous crash was within the
    /// rolling `window`, otherwise restarts the count at 1. At `threshold`
    /// the session transitions to `CrashLocked`; below it, to `Starting`
    /// (the caller is expected to relaunch).
    pub fn record_crash(
        &mut self,
        now: DateTime<Utc>,
        window: TimeDelta,
        threshold: u32,
    ) -> CrashOutcome {
        let within_window = self
            .last_crash_at
            .is_some_and(|prior| now.signed_duration_since(prior) <= window);
        self.crash_count = if within_window {
            self.crash_count.saturating_add(1)
        } else {
            1
        };
        self.last_crash_at = Some(now);

        if self.crash_count >= threshold {
            self.state = SessionState::CrashLocked;
            CrashOutcome::Locked
        } else {
            self.state = SessionState::Starting;
            CrashOutcome::Relaunch {
                count: self.crash_count,
            }
        }
    }

    /// Clear the crash lock: `CrashLocked -> Offline`, counter reset.
    ///
    /// # Errors
    ///
    /// Rejected when the session is not crash-locked.
    pub fn unlock(&mut self) -> Result<(), StateRejection> {
        if self.state != SessionState::CrashLocked {
            return Err(StateRejection::NotLocked);
        }
        self.state = SessionState::Offline;
        self.crash_count = 0;
        self.last_crash_at = None;
        Ok(())
    }

    /// Forcefully mark the session online or offline, used when an operator
    /// managed the process out of band.
    ///
    /// # Errors
    ///
    /// Rejected while crash-locked; the lock must be cleared explicitly.
    pub fn set_state_forced(&mut self, online: bool) -> Result<(), StateRejection> {
        if self.state == SessionState::CrashLocked {
            return Err(StateRejection::CrashLockActive);
        }
        self.state = if online {
            SessionState::Running
        } else {
            SessionState::Offline
        };
        Ok(())
    }
}
