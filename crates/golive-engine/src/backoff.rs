//! Reconnect backoff policy.

use std::time::Duration;

/// Maximum failure-triggered reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Ceiling for the backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt`: `min(2^attempt, 30)` seconds.
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let exp = Duration::from_secs(2u64.saturating_pow(attempt));
    exp.min(MAX_BACKOFF)
}

/// Whether another attempt is allowed after `attempt` failures.
pub fn should_retry(attempt: u32) -> bool {
    attempt < MAX_RECONNECT_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_ceiling() {
        let delays: Vec<u64> = (1..=MAX_RECONNECT_ATTEMPTS)
            .map(|attempt| delay_for_attempt(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30]);
    }

    #[test]
    fn large_attempts_stay_capped() {
        assert_eq!(delay_for_attempt(10), MAX_BACKOFF);
        assert_eq!(delay_for_attempt(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn retries_stop_after_the_cap() {
        assert!(should_retry(0));
        assert!(should_retry(4));
        assert!(!should_retry(5));
        assert!(!should_retry(6));
    }
}
