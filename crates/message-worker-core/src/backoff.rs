//! Retry delay calculation.

use crate::queue::RetryPolicy;

/// Ceiling applied when a delay is used as a visibility timeout (12 hours,
/// the broker-side maximum).
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Delay in milliseconds before the given retry attempt.
///
/// `attempt` is 1-indexed: the attempt being scheduled next. With backoff
/// disabled every attempt waits the base delay; with backoff enabled the
/// delay grows linearly with the attempt, capped at `max_retry_delay_ms`.
pub fn retry_delay_ms(attempt: u32, policy: &RetryPolicy) -> u64 {
    if !policy.allow_retry_back_off {
        return policy.retry_delay_ms;
    }

    (u64::from(attempt))
        .saturating_mul(policy.retry_delay_ms)
        .min(policy.max_retry_delay_ms)
}

/// Converts a millisecond delay to the whole-second visibility timeout the
/// cloud-style broker accepts, clamped to [`MAX_VISIBILITY_TIMEOUT_SECS`].
pub fn visibility_timeout_secs(delay_ms: u64) -> u64 {
    (delay_ms / 1_000).min(MAX_VISIBILITY_TIMEOUT_SECS)
}
