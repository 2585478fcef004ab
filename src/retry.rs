use crate::config::declarations::{JitterMode, RetryPolicy};
use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based): exponential from the base,
/// capped at the maximum, then jittered.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let ceiling = exponential(policy.base_backoff, policy.max_backoff, attempt);
    match policy.jitter {
        JitterMode::None => ceiling,
        JitterMode::Equal => jitter_between(ceiling / 2, ceiling),
        JitterMode::Full => jitter_between(Duration::ZERO, ceiling),
    }
}

fn exponential(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let min_secs = min.as_secs_f64();
    let span = max.as_secs_f64() - min_secs;
    let sample = rng.gen::<f64>() * span + min_secs;
    Duration::from_secs_f64(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: JitterMode) -> RetryPolicy {
        RetryPolicy {
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(20),
            jitter,
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = policy(JitterMode::None);
        let delays: Vec<_> = (1..=6).map(|attempt| backoff_delay(&policy, attempt)).collect();
        assert_eq!(
            delays,
            vec![2, 4, 8, 16, 20, 20]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let policy = policy(JitterMode::None);
        assert_eq!(backoff_delay(&policy, u32::MAX), Duration::from_secs(20));
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        let policy = policy(JitterMode::Equal);
        for _ in 0..64 {
            let delay = backoff_delay(&policy, 3);
            assert!(delay >= Duration::from_secs(4) && delay <= Duration::from_secs(8));
        }
    }

    #[test]
    fn full_jitter_never_exceeds_ceiling() {
        let policy = policy(JitterMode::Full);
        for _ in 0..64 {
            assert!(backoff_delay(&policy, 2) <= Duration::from_secs(4));
        }
    }
}
