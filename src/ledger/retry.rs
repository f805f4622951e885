//! Retry-on-conflict for numbering races.

use crate::error::Result;
use tracing::debug;

/// Default number of re-runs after the first attempt.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Run `attempt` until it succeeds, fails with a non-retryable error, or has
/// been re-run `retries` times. The attempt index is passed in, starting at 0.
///
/// Exhaustion returns the last conflict unchanged.
pub fn with_conflict_retry<T>(retries: u32, mut attempt: impl FnMut(u32) -> Result<T>) -> Result<T> {
    let mut tries = 0;
    loop {
        match attempt(tries) {
            Err(e) if e.is_retryable() && tries < retries => {
                tries += 1;
                debug!(attempt = tries, error = %e, "retrying after number conflict");
                std::thread::yield_now();
            }
            other => return other,
        }
    }
}
