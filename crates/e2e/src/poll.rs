//! Bounded polling - race a fixed-duration timeout against a retry loop

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Interval between condition checks. Fixed cadence, no backoff: data
/// arrival in the test stack is fast and bounded.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Repeatedly invoke `check` every [`POLL_INTERVAL`] until it yields a value
/// or `timeout` elapses, whichever happens first.
///
/// The deadline and the retry loop are raced with `select!`; a check that
/// would have succeeded after the deadline is simply discarded. Checks must
/// be cheap idempotent reads, so nothing is actively cancelled.
///
/// Timing out is not an error. `None` means "nothing arrived in time" and
/// the caller decides what that implies.
pub async fn poll_until<T, F, Fut>(mut check: F, timeout: Duration) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return None,
            found = check() => {
                if let Some(value) = found {
                    return Some(value);
                }
            }
        }

        tokio::select! {
            _ = &mut deadline => return None,
            _ = sleep(POLL_INTERVAL) => {}
        }
    }
}
