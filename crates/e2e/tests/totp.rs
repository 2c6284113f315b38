//! Behavior of the rollover-safe code generator against the real clock

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use accounts_e2e::config::TOTP_USER_SECRET;
use accounts_e2e::totp::{generate_valid, remaining_seconds, verify, TotpConfig};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// A config whose window, at the moment of the call, has `remaining`
/// seconds left. Shifting the origin moves the window boundary without
/// touching the clock.
fn config_with_remaining(remaining: u64) -> TotpConfig {
    let period = 30;
    TotpConfig {
        period,
        epoch: now_secs() - (period - remaining),
        ..TotpConfig::default()
    }
}

#[tokio::test]
async fn generated_code_verifies_at_the_moment_of_return() {
    let config = TotpConfig::default();
    let code = generate_valid(TOTP_USER_SECRET, &config).await.unwrap();

    assert_eq!(code.len(), 6);
    assert!(verify(&code, TOTP_USER_SECRET, &config));
}

#[tokio::test]
async fn comfortable_margin_returns_immediately() {
    let config = config_with_remaining(25);
    let start = Instant::now();

    let code = generate_valid(TOTP_USER_SECRET, &config).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(verify(&code, TOTP_USER_SECRET, &config));
}

#[tokio::test]
async fn near_expiry_waits_for_the_next_window() {
    // Three seconds left in the window: the generator must sleep the
    // window out before handing back a code.
    let config = config_with_remaining(3);
    let start = Instant::now();

    let code = generate_valid(TOTP_USER_SECRET, &config).await.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_secs(3),
        "returned before the window rolled over: {elapsed:?}"
    );
    assert!(verify(&code, TOTP_USER_SECRET, &config));
    // The new window just started, so nearly the full period remains.
    assert!(remaining_seconds(&config) > 20);
}

#[tokio::test]
async fn bad_secret_is_fatal() {
    let config = TotpConfig::default();
    let err = generate_valid("!!definitely not base32!!", &config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Code generation failed"));
}
