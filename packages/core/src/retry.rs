//! Exponential backoff shared by the push channel and the request client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry tuning. Each user keeps its own retry counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor per retry.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub ceiling: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
            ceiling: Duration::from_millis(30_000),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier,
            ..Self::default()
        }
    }

    /// Set the delay ceiling.
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// `min(ceiling, base * multiplier^retry_count)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = u64::from(self.multiplier)
            .checked_pow(retry_count)
            .unwrap_or(u64::MAX);
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor)).min(self.ceiling)
    }

    /// Whether another retry is allowed after `retry_count` retries.
    pub fn allows(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_the_ceiling() {
        let config = RetryConfig::default();
        let delays: Vec<u128> = (0..8).map(|n| config.delay_for(n).as_millis()).collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn huge_exponents_saturate_to_the_ceiling() {
        let config = RetryConfig::new(100, Duration::from_millis(250), 10);
        assert_eq!(config.delay_for(64), Duration::from_millis(30_000));
    }

    #[test]
    fn retry_budget() {
        let config = RetryConfig::new(2, Duration::from_millis(10), 2);
        assert!(config.allows(0));
        assert!(config.allows(1));
        assert!(!config.allows(2));
    }
}
