//! Jittered reconnect backoff for the initial dial to the coordinator: a
//! worker that starts before the coordinator is listening, or loses the
//! connection, retries instead of exiting immediately.

use std::time::Duration;

use rand::Rng;

/// Longest backoff a worker will wait between reconnect attempts,
/// independent of how many attempts have already failed.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff with up to ±25% jitter, capped at `MAX_BACKOFF`.
/// Jitter avoids every worker in a fleet retrying in lockstep after a
/// coordinator restart.
pub fn jittered_delay(attempt: u32) -> Duration {
    let base = Duration::from_millis(250) * 2u32.saturating_pow(attempt.min(8));
    let base = base.min(MAX_BACKOFF);
    let jitter_range = (base.as_millis() as u64 / 4).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_range * 2);
    let adjusted = base.as_millis() as u64 + jitter - jitter_range;
    Duration::from_millis(adjusted).min(MAX_BACKOFF)
}
