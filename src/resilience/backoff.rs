//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt`: `base * 2^(attempt - 1)`, capped at
/// `max` when given. Attempt 0 is the initial call and waits for nothing.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Option<Duration>) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    let delay = base.saturating_mul(factor);
    match max {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// Add up to 10% of `delay` on top of it.
pub fn with_jitter(delay: Duration) -> Duration {
    let range = u64::try_from(delay.as_millis() / 10).unwrap_or(u64::MAX);
    if range == 0 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..range);
    delay.checked_add(Duration::from_millis(extra)).unwrap_or(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_secs(1);
        assert_eq!(calculate_backoff(0, base, None), Duration::ZERO);
        assert_eq!(calculate_backoff(1, base, None), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2, base, None), Duration::from_secs(2));
        assert_eq!(calculate_backoff(3, base, None), Duration::from_secs(4));

        let capped = calculate_backoff(10, Duration::from_millis(100), Some(Duration::from_secs(1)));
        assert_eq!(capped, Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_saturates() {
        let huge = calculate_backoff(200, Duration::from_secs(1), None);
        assert!(huge >= Duration::from_secs(1 << 30));
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..50 {
            let jittered = with_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered < Duration::from_millis(1100));
        }
        assert_eq!(with_jitter(Duration::from_millis(5)), Duration::from_millis(5));
    }

    #[test]
    fn test_jitter_on_saturated_delay() {
        let saturated = calculate_backoff(64, Duration::from_millis(u64::MAX), None);
        assert_eq!(saturated, Duration::MAX);
        assert_eq!(with_jitter(saturated), Duration::MAX);

        let near_max = Duration::MAX - Duration::from_secs(1);
        assert!(with_jitter(near_max) >= near_max);
    }
}
