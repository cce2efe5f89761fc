//! Retry delay calculation for transient dependency failures
//!
//! Used by the messaging client's connect loop and the backup manager's
//! remote transfers. Exponential backoff with jitter so a fleet of
//! instances does not stampede a recovering dependency.

use std::time::Duration;

/// Backoff delay for the given zero-based attempt number
///
/// Doubles from 1s per attempt up to a 16s ceiling, then multiplies by
/// a random ±25% jitter.
pub fn calculate_retry_delay(attempt: u32) -> Duration {
    calculate_retry_delay_with_jitter(attempt, rand::random::<f64>())
}

/// Deterministic variant taking the jitter sample in `[0, 1)` directly,
/// so tests can pin the delay
pub fn calculate_retry_delay_with_jitter(attempt: u32, jitter_random: f64) -> Duration {
    let capped = attempt.min(4);
    let base_delay_secs = 1u64 << capped;

    // Map the sample onto the 0.75..1.25 jitter band.
    let jitter_factor = 0.75 + jitter_random * 0.5;

    Duration::from_secs_f64(base_delay_secs as f64 * jitter_factor)
}
