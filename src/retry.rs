//! Exponential backoff with jitter for rescheduling failed messages.

use rand::Rng;
use std::time::Duration;

/// Base delay for the first retry.
const BASE: Duration = Duration::from_secs(1);

/// Upper bound on the computed delay, before jitter.
const CAP: Duration = Duration::from_secs(5 * 60);

/// Computes the delay before a message's `attempts`'th retry becomes eligible.
///
/// `exp = min(base * 2^attempts, cap)`, plus uniform jitter in `[0, 1s)`.
pub fn backoff(attempts: i32) -> Duration {
    let exponent = attempts.max(0) as u32;
    let exp = BASE
        .checked_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
        .unwrap_or(CAP)
        .min(CAP);

    let jitter_millis = rand::thread_rng().gen_range(0..1000);
    exp + Duration::from_millis(jitter_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert!(backoff(0).as_secs() < 2);
        assert!(backoff(1).as_secs() >= 2 && backoff(1).as_secs() < 3);
        assert!(backoff(2).as_secs() >= 4 && backoff(2).as_secs() < 5);
        assert!(backoff(3).as_secs() >= 8 && backoff(3).as_secs() < 9);

        // Large attempt counts must not overflow and must respect the cap.
        let capped = backoff(30);
        assert!(capped >= Duration::from_secs(300));
        assert!(capped < Duration::from_secs(301));
    }

    #[test]
    fn backoff_bounds_hold_for_every_attempt_count() {
        for attempts in 0..20 {
            let exp_secs = (1u64 << attempts.min(12)).min(300);
            let delay = backoff(attempts);
            assert!(delay >= Duration::from_secs(exp_secs));
            assert!(delay < Duration::from_secs(exp_secs) + Duration::from_secs(1));
        }
    }
}
