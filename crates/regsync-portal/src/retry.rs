use std::time::Duration;

use crate::error::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// No retries and no sleeping.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let shift = u32::try_from(attempt_index).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }

    /// Delay before the next attempt, or `None` when `err` must be returned.
    pub fn next_delay(&self, attempt_index: usize, err: &PortalError) -> Option<Duration> {
        if !err.is_transient() || attempt_index >= self.max_retries {
            return None;
        }
        Some(self.delay_for_attempt(attempt_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(3));
    }

    #[test]
    fn only_transient_errors_get_another_attempt() {
        let policy = BackoffPolicy::default();
        let timeout = PortalError::Timeout {
            url: "u".into(),
            timeout_secs: 30,
        };
        assert_eq!(policy.next_delay(0, &timeout), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(3, &timeout), None);
        assert_eq!(
            policy.next_delay(0, &PortalError::NotFound { url: "u".into() }),
            None
        );
        assert_eq!(BackoffPolicy::none().next_delay(0, &timeout), None);
    }
}
