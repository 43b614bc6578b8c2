//! Process supervision: session state, liveness polling, crash-loop
//! lockout, and scheduled restarts.
//!
//! The supervisor runs as a single actor task that exclusively owns the
//! [`ServerSession`] record, so every state transition is linearized.
//! Collaborators talk to it through a cloneable [`SupervisorHandle`]; each
//! administrative command resolves to exactly one human-readable status
//! string, even when the underlying operation completes later.

pub mod countdown;
pub mod liveness;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::launcher::Launcher;
use crate::rcon::RconHandle;

use countdown::Countdown;
pub use liveness::{ProcessProbe, TmuxProcessProbe};
pub use session::{CrashOutcome, ServerSession, SessionState, StateRejection};

/// Administrative commands accepted by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Start the server if it is offline.
    Startup,
    /// Cleanly stop the server if it is running.
    Shutdown,
    /// Cancel an active restart countdown.
    CancelRestart,
    /// Skip the next N scheduled restarts (cancels an active countdown).
    SkipRestart(u32),
    /// Start (or replace) a restart countdown of the given length.
    QueueRestart(u64),
    /// Force the session online/offline after out-of-band intervention.
    SetState(bool),
    /// Clear the crash-loop lock.
    Unlock,
    /// Describe the daily restart schedule.
    RebootSchedule,
    /// Describe the current session state.
    Status,
}

enum Request {
    Admin {
        command: AdminCommand,
        reply: oneshot::Sender<String>,
    },
    QueryRunning {
        reply: oneshot::Sender<bool>,
    },
}

/// Messages from the supervisor's own timer tasks back into the actor.
#[derive(Debug)]
pub(crate) enum Internal {
    /// A countdown checkpoint was reached.
    CountdownWarning {
        /// Generation of the emitting countdown.
        generation: u64,
        /// Checkpoint text.
        text: String,
    },
    /// A countdown reached zero.
    CountdownExpired {
        /// Generation of the emitting countdown.
        generation: u64,
    },
    /// The post-stop grace period of a scheduled restart elapsed.
    GraceElapsed,
}

/// Cloneable handle to the supervisor actor.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<Request>,
}

impl SupervisorHandle {
    async fn dispatch(&self, command: AdminCommand) -> String {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Request::Admin {
                command,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return "Supervisor is not running.".to_owned();
        }
        reply_rx
            .await
            .unwrap_or_else(|_| "Supervisor dropped the request.".to_owned())
    }

    /// Start the server.
    pub async fn startup(&self) -> String {
        self.dispatch(AdminCommand::Startup).await
    }

    /// Cleanly stop the server.
    pub async fn shutdown(&self) -> String {
        self.dispatch(AdminCommand::Shutdown).await
    }

    /// Cancel an active restart countdown.
    pub async fn cancel_restart(&self) -> String {
        self.dispatch(AdminCommand::CancelRestart).await
    }

    /// Skip the next `count` scheduled restarts.
    pub async fn skip_restart(&self, count: u32) -> String {
        self.dispatch(AdminCommand::SkipRestart(count)).await
    }

    /// Start (or replace) a restart countdown of `seconds`.
    pub async fn queue_restart(&self, seconds: u64) -> String {
        self.dispatch(AdminCommand::QueueRestart(seconds)).await
    }

    /// Force the session online or offline.
    pub async fn set_state(&self, online: bool) -> String {
        self.dispatch(AdminCommand::SetState(online)).await
    }

    /// Clear the crash-loop lock.
    pub async fn unlock(&self) -> String {
        self.dispatch(AdminCommand::Unlock).await
    }

    /// Describe the daily restart schedule.
    pub async fn reboot_schedule(&self) -> String {
        self.dispatch(AdminCommand::RebootSchedule).await
    }

    /// Describe the current session state.
    pub async fn status(&self) -> String {
        self.dispatch(AdminCommand::Status).await
    }

    /// Whether liveness is currently confirmed.
    pub async fn is_running(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Request::QueryRunning { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

/// Shared dependencies for the supervisor actor.
pub struct SupervisorDeps {
    /// Supervised server settings.
    pub server: ServerConfig,
    /// Start/stop control over the process.
    pub launcher: Arc<dyn Launcher>,
    /// External liveness inspection.
    pub probe: Arc<dyn ProcessProbe>,
    /// Command transport for in-game countdown announcements.
    pub rcon: RconHandle,
    /// Operator-visible notices (crash events, restart lifecycle).
    pub notices: mpsc::Sender<String>,
}

/// Spawn the supervisor actor.
///
/// `initially_running` seeds the session state from a process inspection
/// performed before spawn. The actor exits when `shutdown_rx` flips true.
///
/// # Errors
///
/// Returns an error when the configured restart schedule is invalid.
pub fn spawn(
    deps: SupervisorDeps,
    initially_running: bool,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<SupervisorHandle> {
    let schedule = deps.server.restart_schedule()?;
    let timezone = deps.server.timezone()?;

    let (request_tx, request_rx) = mpsc::channel(32);
    let (internal_tx, internal_rx) = mpsc::channel(32);

    let supervisor = Supervisor {
        session: ServerSession::new(initially_running),
        schedule,
        timezone,
        last_schedule_check: Utc::now().with_timezone(&timezone),
        countdown: None,
        countdown_generation: 0,
        grace_task: None,
        internal_tx,
        deps,
    };

    tokio::spawn(supervisor.run(request_rx, internal_rx, shutdown_rx));
    Ok(SupervisorHandle { tx: request_tx })
}

struct Supervisor {
    session: ServerSession,
    schedule: cron::Schedule,
    timezone: FixedOffset,
    last_schedule_check: DateTime<FixedOffset>,
    countdown: Option<Countdown>,
    countdown_generation: u64,
    grace_task: Option<tokio::task::JoinHandle<()>>,
    internal_tx: mpsc::Sender<Internal>,
    deps: SupervisorDeps,
}

impl Supervisor {
    async fn run(
        mut self,
        mut request_rx: mpsc::Receiver<Request>,
        mut internal_rx: mpsc::Receiver<Internal>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let interval_secs = self.deps.server.liveness_interval_secs;
        info!(interval_secs, "supervisor started");

        let mut poll = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // Skip the first immediate tick.
        poll.tick().await;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_liveness().await;
                    self.check_schedule().await;
                }
                Some(request) = request_rx.recv() => match request {
                    Request::Admin { command, reply } => {
                        let response = self.handle_admin(command).await;
                        let _ = reply.send(response);
                    }
                    Request::QueryRunning { reply } => {
                        let _ = reply.send(self.session.is_running());
                    }
                },
                Some(message) = internal_rx.recv() => {
                    self.handle_internal(message).await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
        if let Some(grace) = self.grace_task.take() {
            grace.abort();
        }
        info!("supervisor stopped");
    }

    // ── liveness ────────────────────────────────────────────────

    async fn poll_liveness(&mut self) {
        let alive = match self.deps.probe.is_alive().await {
            Ok(alive) => alive,
            Err(e) => {
                // Inspection loss is non-fatal: unknown, assume offline.
                warn!(error = %e, "process probe failed, assuming offline");
                false
            }
        };

        match (alive, self.session.state()) {
            (true, SessionState::Starting) => {
                self.session.confirm_started();
                info!("server liveness confirmed");
                self.notify("The server is up.").await;
            }
            (false, SessionState::Stopping) => {
                self.session.confirm_stopped();
                info!("server stopped as expected");
                self.notify("The server has stopped.").await;
            }
            (false, SessionState::Running) => {
                self.handle_crash().await;
            }
            _ => {}
        }
    }

    async fn handle_crash(&mut self) {
        let window_secs = self.deps.server.crash_window_secs;
        let window = TimeDelta::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX));
        let threshold = self.deps.server.crash_threshold;

        match self.session.record_crash(Utc::now(), window, threshold) {
            CrashOutcome::Relaunch { count } => {
                warn!(count, threshold, "unexpected server exit, relaunching");
                // Any armed countdown belonged to the process that just died.
                self.clear_countdown();
                self.notify(&format!(
                    "Server crashed ({count}/{threshold} within the crash window); relaunching."
                ))
                .await;
                if let Err(e) = self.deps.launcher.start().await {
                    error!(error = %e, "failed to relaunch after crash");
                }
            }
            CrashOutcome::Locked => {
                error!(threshold, "crash loop detected, startup locked");
                self.clear_countdown();
                self.notify(&format!(
                    "Server crashed {threshold} times within {window_secs}s. \
                     Automatic restarts are locked until an operator unlocks them."
                ))
                .await;
            }
        }
    }

    // ── scheduled restart ───────────────────────────────────────

    async fn check_schedule(&mut self) {
        if !self.deps.server.auto_restart {
            return;
        }
        let now = Utc::now().with_timezone(&self.timezone);
        let due = self
            .schedule
            .after(&self.last_schedule_check)
            .take(1)
            .any(|trigger| trigger <= now);
        if !due {
            return;
        }
        self.last_schedule_check = now;

        if self.session.state() != SessionState::Running {
            info!("scheduled restart trigger ignored, server not running");
            return;
        }
        if self.session.restart_locked() {
            info!("scheduled restart trigger ignored, restart already in progress");
            return;
        }
        if self.session.consume_skip() {
            let remaining = self.session.skip_count();
            info!(remaining, "scheduled restart skipped");
            self.notify(&format!(
                "Scheduled restart skipped ({remaining} skip(s) remaining)."
            ))
            .await;
            return;
        }

        let delay = self.deps.server.restart_delay_secs;
        info!(delay, "scheduled restart countdown started");
        self.start_countdown(delay);
    }

    fn start_countdown(&mut self, seconds: u64) {
        self.clear_countdown();
        self.countdown_generation = self.countdown_generation.wrapping_add(1);
        self.session.set_pending_restart_secs(seconds);
        self.countdown = Some(Countdown::spawn(
            self.countdown_generation,
            seconds,
            self.internal_tx.clone(),
        ));
    }

    fn clear_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
        self.session.set_pending_restart_secs(0);
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::CountdownWarning { generation, text } => {
                if self.current_generation() != Some(generation) {
                    return;
                }
                info!(%text, "countdown checkpoint");
                if let Err(e) = self.deps.rcon.send(&format!("say {text}")).await {
                    warn!(error = %e, "failed to announce countdown in-game");
                }
            }
            Internal::CountdownExpired { generation } => {
                if self.current_generation() != Some(generation) {
                    return;
                }
                self.countdown = None;
                self.session.set_pending_restart_secs(0);
                self.begin_restart_sequence().await;
            }
            Internal::GraceElapsed => {
                self.grace_task = None;
                self.finish_restart_sequence().await;
            }
        }
    }

    fn current_generation(&self) -> Option<u64> {
        self.countdown.as_ref().map(Countdown::generation)
    }

    /// Countdown expiry: stop the process and arm the grace timer.
    async fn begin_restart_sequence(&mut self) {
        self.session.set_restart_locked(true);

        match self.session.begin_shutdown() {
            Ok(()) => {
                if let Err(e) = self.deps.launcher.stop().await {
                    error!(error = %e, "failed to issue stop for scheduled restart");
                }
            }
            Err(rejection) => {
                // The server vanished during the countdown; still go
                // through the grace period before starting it back up.
                warn!(%rejection, "restart expiry with server not running");
            }
        }
        self.notify("Scheduled restart in progress.").await;

        let grace = Duration::from_secs(self.deps.server.shutdown_grace_secs);
        let tx = self.internal_tx.clone();
        self.grace_task = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Internal::GraceElapsed).await;
        }));
    }

    /// Grace elapsed: bring the process back up, clearing locks.
    async fn finish_restart_sequence(&mut self) {
        self.session.confirm_stopped();
        self.session.set_restart_locked(false);

        match self.session.begin_startup() {
            Ok(()) => {
                if let Err(e) = self.deps.launcher.start().await {
                    error!(error = %e, "failed to relaunch after scheduled restart");
                    self.session.abort_startup();
                    self.notify("Scheduled restart failed to relaunch the server.")
                        .await;
                    return;
                }
                self.notify("Scheduled restart complete; the server is starting.")
                    .await;
            }
            Err(rejection) => {
                warn!(%rejection, "cannot relaunch after scheduled restart");
            }
        }
    }

    // ── administrative commands ─────────────────────────────────

    async fn handle_admin(&mut self, command: AdminCommand) -> String {
        match command {
            AdminCommand::Startup => match self.session.begin_startup() {
                Ok(()) => match self.deps.launcher.start().await {
                    Ok(()) => "Server startup issued.".to_owned(),
                    Err(e) => {
                        self.session.abort_startup();
                        format!("Failed to issue startup: {e}")
                    }
                },
                Err(rejection) => rejection.to_string(),
            },
            AdminCommand::Shutdown => match self.session.begin_shutdown() {
                Ok(()) => match self.deps.launcher.stop().await {
                    Ok(()) => "Server is shutting down.".to_owned(),
                    Err(e) => {
                        self.session.abort_shutdown();
                        format!("Failed to issue shutdown: {e}")
                    }
                },
                Err(rejection) => rejection.to_string(),
            },
            AdminCommand::CancelRestart => {
                if self.countdown.is_some() {
                    self.clear_countdown();
                    "Scheduled restart cancelled.".to_owned()
                } else {
                    "No restart in progress.".to_owned()
                }
            }
            AdminCommand::SkipRestart(count) => {
                self.session.set_skip_count(count);
                // An active countdown only counts as the first skip when
                // there is actually a skip to consume.
                if self.countdown.is_some() && self.session.consume_skip() {
                    self.clear_countdown();
                    let remaining = self.session.skip_count();
                    format!(
                        "Active restart countdown cancelled; \
                         {remaining} further scheduled restart(s) will be skipped."
                    )
                } else {
                    format!("The next {count} scheduled restart(s) will be skipped.")
                }
            }
            AdminCommand::QueueRestart(seconds) => {
                if self.session.state() != SessionState::Running {
                    return format!(
                        "Server is not running (currently {}); cannot queue a restart.",
                        self.session.state().describe()
                    );
                }
                let replaced = self.countdown.is_some();
                self.start_countdown(seconds);
                if replaced {
                    format!("Existing countdown replaced; restarting in {seconds} seconds.")
                } else {
                    format!("Restart queued in {seconds} seconds.")
                }
            }
            AdminCommand::SetState(online) => match self.session.set_state_forced(online) {
                Ok(()) => format!(
                    "Session state set to {}.",
                    if online { "online" } else { "offline" }
                ),
                Err(rejection) => rejection.to_string(),
            },
            AdminCommand::Unlock => match self.session.unlock() {
                Ok(()) => "Crash lock cleared; the server may be started again.".to_owned(),
                Err(rejection) => rejection.to_string(),
            },
            AdminCommand::RebootSchedule => format!(
                "Server restarts daily at {} ({}) after a {}-second countdown.",
                self.deps.server.restart_time,
                self.deps.server.utc_offset,
                self.deps.server.restart_delay_secs
            ),
            AdminCommand::Status => {
                let mut status = format!("Server is {}.", self.session.state().describe());
                if self.session.pending_restart_secs() > 0 {
                    status.push_str(&format!(
                        " Restart countdown armed ({}s).",
                        self.session.pending_restart_secs()
                    ));
                }
                if self.session.skip_count() > 0 {
                    status.push_str(&format!(
                        " {} scheduled restart(s) will be skipped.",
                        self.session.skip_count()
                    ));
                }
                if self.session.crash_count() > 0 {
                    status.push_str(&format!(
                        " {} crash(es) in the current window.",
                        self.session.crash_count()
                    ));
                }
                status
            }
        }
    }

    async fn notify(&self, text: &str) {
        if self.deps.notices.send(text.to_owned()).await.is_err() {
            warn!("notice channel closed, dropping operator notice");
        }
    }
}
