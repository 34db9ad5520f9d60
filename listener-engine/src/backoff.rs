use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect backoff settings for the connection supervisor.
///
/// The delay for the Nth consecutive failure is
/// `min(base_delay * 2^min(N-1, cap_exponent), max_delay)`. The supervisor
/// resets its failure counter on every successful `Listening` transition.
///
/// `initial_retry_budget` bounds the initial connection phase: if the process
/// never manages to listen, it stops after that many consecutive failures.
/// Once listening has succeeded at least once, reconnects continue forever
/// unless `steady_retry_ceiling` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub cap_exponent: u32,
    pub initial_retry_budget: u32,
    pub steady_retry_ceiling: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            cap_exponent: 6,
            initial_retry_budget: 10,
            steady_retry_ceiling: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `failures` consecutive failures
    /// (1-based; `failures == 0` means no wait).
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(self.cap_exponent);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            cap_exponent: 6,
            initial_retry_budget: 10,
            steady_retry_ceiling: None,
        }
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let policy = policy();
        // Three consecutive heartbeat failures: base, base*2, base*4.
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
    }

    #[test]
    fn test_exponent_cap() {
        let policy = BackoffPolicy {
            max_delay_ms: u64::MAX,
            cap_exponent: 3,
            ..policy()
        };
        // 2^3 is the ceiling no matter how many failures pile up.
        assert_eq!(policy.delay_for(4), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(8_000));
    }

    #[test]
    fn test_max_delay_clamp() {
        let policy = BackoffPolicy {
            max_delay_ms: 5_000,
            ..policy()
        };
        assert_eq!(policy.delay_for(10), Duration::from_millis(5_000));
    }

    #[test]
    fn test_monotonically_non_decreasing() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for failures in 1..20 {
            let delay = policy.delay_for(failures);
            assert!(delay >= previous, "delay shrank at failure {failures}");
            previous = delay;
        }
    }

    #[test]
    fn test_zero_failures_no_wait() {
        assert_eq!(policy().delay_for(0), Duration::ZERO);
    }
}
