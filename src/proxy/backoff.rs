//! Exponential backoff between retry attempts.

use std::time::Duration;

/// Delay before the next attempt after `attempts` failed ones.
///
/// `base * 2^(attempts - 1)`, capped at `cap`. A zero base disables backoff.
pub fn backoff_delay(base: Duration, cap: Duration, attempts: u32) -> Duration {
    if attempts == 0 || base.is_zero() {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempts - 1);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}
