//! Unary retry policy: linear backoff with a bounded attempt count.
//!
//! The streaming call never goes through this — once response bytes may
//! have reached a client, retrying belongs to the orchestrator.

use std::time::Duration;

/// Retry configuration for unary upstream calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Extra attempts after the initial request.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base_delay * (n + 1)`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Linear backoff delay before retrying after failed attempt `attempt`
    /// (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(config.delay_for(0), Duration::from_millis(500));
        assert_eq!(config.delay_for(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for(2), Duration::from_millis(1500));
    }

    #[test]
    fn defaults_match_the_documented_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay, Duration::from_secs(1));
    }
}
