//! Time-windowed one-time codes (HMAC-SHA1, RFC 6238)
//!
//! The browser fills a code into a form and submits it; a code that rolls
//! over mid-flight fails the login. [`generate_valid`] therefore refuses to
//! hand out codes with a too-small remaining window and waits for the next
//! one instead.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::info;

use crate::error::{E2eError, E2eResult};

/// Codes with this much validity or less are considered near-expiry.
const MIN_REMAINING_SECS: u64 = 5;

/// Explicit per-call configuration. The window origin is a parameter rather
/// than process-wide state, so concurrent tests cannot trample each other.
#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Window length in seconds.
    pub period: u64,
    /// Decimal digits in the code.
    pub digits: u32,
    /// Origin offset in epoch seconds for window numbering.
    pub epoch: u64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            period: 30,
            digits: 6,
            epoch: 0,
        }
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn decode_secret(secret: &str) -> E2eResult<Vec<u8>> {
    let normalized = secret.trim().trim_end_matches('=').to_ascii_uppercase();
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|e| E2eError::CodeGeneration(format!("invalid base32 secret: {e}")))
}

/// Generate the code for the window containing `time` (epoch seconds).
pub fn generate_at(secret: &str, config: &TotpConfig, time: u64) -> E2eResult<String> {
    if config.period == 0 {
        return Err(E2eError::CodeGeneration("period must be non-zero".into()));
    }

    let key = decode_secret(secret)?;
    let counter = time.saturating_sub(config.epoch) / config.period;

    let mut mac = Hmac::<Sha1>::new_from_slice(&key)
        .map_err(|e| E2eError::CodeGeneration(format!("invalid HMAC key: {e}")))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // RFC 4226 dynamic truncation
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    let modulus = 10u32.pow(config.digits);
    Ok(format!(
        "{:0width$}",
        binary % modulus,
        width = config.digits as usize
    ))
}

/// Generate the code for the current window.
pub fn generate(secret: &str, config: &TotpConfig) -> E2eResult<String> {
    generate_at(secret, config, now_epoch_secs())
}

/// Check `code` against the window containing `time`. Exact-window match,
/// no drift allowance.
pub fn verify_at(code: &str, secret: &str, config: &TotpConfig, time: u64) -> bool {
    match generate_at(secret, config, time) {
        Ok(expected) => expected == code,
        Err(_) => false,
    }
}

/// Check `code` against the current window.
pub fn verify(code: &str, secret: &str, config: &TotpConfig) -> bool {
    verify_at(code, secret, config, now_epoch_secs())
}

/// Seconds until the window containing `time` rolls over.
pub fn remaining_seconds_at(config: &TotpConfig, time: u64) -> u64 {
    debug_assert!(config.period > 0);
    config.period - time.saturating_sub(config.epoch) % config.period
}

/// Seconds until the current window rolls over.
pub fn remaining_seconds(config: &TotpConfig) -> u64 {
    remaining_seconds_at(config, now_epoch_secs())
}

/// Produce a code that stays valid long enough to be typed and submitted.
///
/// A candidate that fails its own verification is fatal: the secret or the
/// clock is wrong, and retrying cannot help. A candidate with five seconds
/// or less of validity left is discarded; we sleep out the window plus one
/// second and return the next window's code. The retry path does not
/// re-check margin - the new window just started, so the code has
/// effectively full validity.
pub async fn generate_valid(secret: &str, config: &TotpConfig) -> E2eResult<String> {
    let candidate = generate(secret, config)?;
    let remaining = remaining_seconds(config);

    if !verify(&candidate, secret, config) {
        return Err(E2eError::CodeGeneration(
            "freshly generated code failed verification".into(),
        ));
    }

    if remaining <= MIN_REMAINING_SECS {
        info!("code expires in {remaining}s, waiting for the next window");
        tokio::time::sleep(Duration::from_secs(remaining + 1)).await;
        return generate(secret, config);
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    // RFC 6238 appendix B, SHA-1 rows truncated to six digits. The shared
    // secret is the ASCII string "12345678901234567890" in base32.
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test_case(59, "287082")]
    #[test_case(1_111_111_109, "081804")]
    #[test_case(1_111_111_111, "050471")]
    #[test_case(1_234_567_890, "005924")]
    #[test_case(2_000_000_000, "279037")]
    #[test_case(20_000_000_000, "353130")]
    fn rfc6238_vectors(time: u64, expected: &str) {
        let config = TotpConfig::default();
        assert_eq!(generate_at(RFC_SECRET, &config, time).unwrap(), expected);
        assert!(verify_at(expected, RFC_SECRET, &config, time));
    }

    #[test]
    fn codes_are_zero_padded() {
        let config = TotpConfig::default();
        let code = generate_at(RFC_SECRET, &config, 1_234_567_890).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.starts_with("00"));
    }

    #[test]
    fn verify_rejects_other_windows() {
        let config = TotpConfig::default();
        let code = generate_at(RFC_SECRET, &config, 59).unwrap();
        assert!(!verify_at(&code, RFC_SECRET, &config, 59 + config.period));
    }

    #[test]
    fn lowercase_and_padded_secrets_are_accepted() {
        let config = TotpConfig::default();
        let canonical = generate_at("JBSWY3DPEHPK3PXP", &config, 59).unwrap();
        assert_eq!(
            generate_at("jbswy3dpehpk3pxp", &config, 59).unwrap(),
            canonical
        );
        assert_eq!(
            generate_at("JBSWY3DPEHPK3PXP======", &config, 59).unwrap(),
            canonical
        );
    }

    #[test]
    fn undecodable_secret_is_a_generation_error() {
        let config = TotpConfig::default();
        let err = generate_at("not-base32!", &config, 59).unwrap_err();
        assert!(matches!(err, E2eError::CodeGeneration(_)));
    }

    #[test_case(0, 30 ; "window start")]
    #[test_case(1, 29)]
    #[test_case(29, 1 ; "last second")]
    #[test_case(30, 30 ; "next window start")]
    #[test_case(59, 1)]
    fn remaining_tracks_window_position(time: u64, expected: u64) {
        let config = TotpConfig::default();
        assert_eq!(remaining_seconds_at(&config, time), expected);
    }

    #[test]
    fn remaining_respects_custom_epoch() {
        let config = TotpConfig {
            epoch: 100,
            ..TotpConfig::default()
        };
        assert_eq!(remaining_seconds_at(&config, 100), 30);
        assert_eq!(remaining_seconds_at(&config, 127), 3);
    }
}
