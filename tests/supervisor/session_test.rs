//! Tests for `src/supervisor/session.rs` — the pure session state machine.

use chrono::{DateTime, TimeDelta, Utc};

use bridgekeeper::supervisor::{CrashOutcome, ServerSession, SessionState, StateRejection};

const THRESHOLD: u32 = 5;

fn window() -> TimeDelta {
    TimeDelta::seconds(300)
}

fn later(t0: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    t0.checked_add_signed(TimeDelta::seconds(secs))
        .expect("timestamp in range")
}

#[test]
fn startup_walks_offline_starting_running() {
    let mut session = ServerSession::new(false);
    assert_eq!(session.state(), SessionState::Offline);

    session.begin_startup().expect("offline server can start");
    assert_eq!(session.state(), SessionState::Starting);
    assert!(!session.is_running());

    session.confirm_started();
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.is_running());
}

#[test]
fn startup_rejected_when_not_offline() {
    let mut session = ServerSession::new(true);
    let rejection = session.begin_startup().expect_err("already running");
    assert_eq!(
        rejection,
        StateRejection::AlreadyRunning { current: "running" }
    );
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn shutdown_walks_running_stopping_offline() {
    let mut session = ServerSession::new(true);
    session.begin_shutdown().expect("running server can stop");
    assert_eq!(session.state(), SessionState::Stopping);
    session.confirm_stopped();
    assert_eq!(session.state(), SessionState::Offline);
}

#[test]
fn shutdown_rejected_when_not_running() {
    let mut session = ServerSession::new(false);
    let rejection = session.begin_shutdown().expect_err("offline server");
    assert_eq!(rejection, StateRejection::NotRunning { current: "offline" });
}

#[test]
fn running_and_stopping_are_never_reported_together() {
    // The state is a single enum, so the old running/stopping flag pair
    // cannot diverge; walk every transition and check the derived view.
    let mut session = ServerSession::new(false);
    let check = |s: &ServerSession| {
        let stopping = s.state() == SessionState::Stopping;
        assert!(!(s.is_running() && stopping));
    };

    check(&session);
    session.begin_startup().expect("start");
    check(&session);
    session.confirm_started();
    check(&session);
    session.begin_shutdown().expect("stop");
    check(&session);
    session.confirm_stopped();
    check(&session);
}

#[test]
fn five_crashes_within_window_lock_the_session() {
    let mut session = ServerSession::new(true);
    let t0 = Utc::now();

    for i in 1..THRESHOLD {
        let at = later(t0, i64::from(i).saturating_mul(10));
        let outcome = session.record_crash(at, window(), THRESHOLD);
        assert_eq!(outcome, CrashOutcome::Relaunch { count: i });
        assert_eq!(session.state(), SessionState::Starting);
        // Relaunch confirmed before the next crash.
        session.confirm_started();
    }

    let at = later(t0, i64::from(THRESHOLD).saturating_mul(10));
    let outcome = session.record_crash(at, window(), THRESHOLD);
    assert_eq!(outcome, CrashOutcome::Locked);
    assert_eq!(session.state(), SessionState::CrashLocked);

    // Startup refused until the lock is cleared explicitly.
    assert_eq!(
        session.begin_startup(),
        Err(StateRejection::CrashLockActive)
    );
}

#[test]
fn crash_count_resets_after_the_window_elapses() {
    let mut session = ServerSession::new(true);
    let t0 = Utc::now();

    assert_eq!(
        session.record_crash(t0, window(), THRESHOLD),
        CrashOutcome::Relaunch { count: 1 }
    );
    session.confirm_started();
    assert_eq!(
        session.record_crash(later(t0, 100), window(), THRESHOLD),
        CrashOutcome::Relaunch { count: 2 }
    );
    session.confirm_started();

    // Next crash lands outside the rolling window: back to 1, not 3.
    assert_eq!(
        session.record_crash(later(t0, 500), window(), THRESHOLD),
        CrashOutcome::Relaunch { count: 1 }
    );
}

#[test]
fn unlock_clears_the_crash_lock_and_counter() {
    let mut session = ServerSession::new(true);
    let t0 = Utc::now();
    for _ in 0..THRESHOLD {
        session.record_crash(t0, window(), THRESHOLD);
    }
    assert_eq!(session.state(), SessionState::CrashLocked);

    session.unlock().expect("locked session unlocks");
    assert_eq!(session.state(), SessionState::Offline);
    assert_eq!(session.crash_count(), 0);
    session.begin_startup().expect("startup allowed again");
}

#[test]
fn unlock_rejected_when_not_locked() {
    let mut session = ServerSession::new(false);
    assert_eq!(session.unlock(), Err(StateRejection::NotLocked));
}

#[test]
fn skips_are_consumed_one_at_a_time() {
    let mut session = ServerSession::new(true);
    session.set_skip_count(2);
    assert!(session.consume_skip());
    assert!(session.consume_skip());
    assert!(!session.consume_skip());
    assert_eq!(session.skip_count(), 0);
}

#[test]
fn forced_state_rejected_while_crash_locked() {
    let mut session = ServerSession::new(true);
    let t0 = Utc::now();
    for _ in 0..THRESHOLD {
        session.record_crash(t0, window(), THRESHOLD);
    }
    assert_eq!(
        session.set_state_forced(true),
        Err(StateRejection::CrashLockActive)
    );

    session.unlock().expect("unlock");
    session.set_state_forced(true).expect("forced online");
    assert!(session.is_running());
}
