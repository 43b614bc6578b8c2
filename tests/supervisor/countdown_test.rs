//! Tests for `src/supervisor/countdown.rs` — checkpoint selection.

use bridgekeeper::supervisor::countdown::warning_for;

#[test]
fn zero_announces_the_restart_itself() {
    assert_eq!(warning_for(0).as_deref(), Some("Restarting now."));
}

#[test]
fn final_ten_seconds_tick_every_second() {
    for secs in 1..=10 {
        let text = warning_for(secs).expect("final stretch always warns");
        assert!(text.starts_with("Automatic restart in"), "{text}");
        assert!(text.contains(&secs.to_string()), "{text}");
    }
    assert_eq!(
        warning_for(1).as_deref(),
        Some("Automatic restart in 1 second.")
    );
}

#[test]
fn minute_scale_checkpoints_use_minute_phrasing() {
    assert_eq!(
        warning_for(30).as_deref(),
        Some("Automatic restart in 30 seconds.")
    );
    assert_eq!(
        warning_for(60).as_deref(),
        Some("Automatic restart in 1 minute.")
    );
    assert_eq!(
        warning_for(300).as_deref(),
        Some("Automatic restart in 5 minutes.")
    );
    assert_eq!(
        warning_for(600).as_deref(),
        Some("Automatic restart in 10 minutes.")
    );
    assert_eq!(
        warning_for(900).as_deref(),
        Some("Automatic restart in 15 minutes.")
    );
    assert_eq!(
        warning_for(1800).as_deref(),
        Some("Automatic restart in 30 minutes.")
    );
    assert_eq!(
        warning_for(3600).as_deref(),
        Some("Automatic restart in 1 hour.")
    );
}

#[test]
fn off_checkpoint_values_are_silent() {
    for secs in [11, 29, 31, 45, 59, 61, 299, 301, 899, 3599, 3601, 86_400] {
        assert_eq!(warning_for(secs), None, "{secs}s should be silent");
    }
}
