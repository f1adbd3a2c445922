//! Wait schedule between attempts.
//!
//! The engines ask a [`BackoffPolicy`] how long to sleep before each retry, so
//! tests can swap in [`NoBackoff`] and run without real delays.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pushgate_common::GatewayError;
use pushgate_common::config::GatewayConfig;

/// Strategy deciding how long to wait before a retry.
pub trait BackoffPolicy: Send + Sync {
    /// `attempt` is zero-based: 0 is the wait before the first retry.
    fn delay(&self, attempt: u32) -> Duration;
}

/// `min(2^attempt * initial, max)`.
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    initial
        .checked_mul(factor)
        .map_or(max, |delay| delay.min(max))
}

/// Doubling backoff capped at a maximum step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), Duration::from_millis(1_024_000))
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.initial, self.max)
    }
}

/// Retries immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), GatewayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_doubles_from_initial_delay() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.delay(0), ms(1_000));
        assert_eq!(policy.delay(1), ms(2_000));
        assert_eq!(policy.delay(2), ms(4_000));
        assert_eq!(policy.delay(5), ms(32_000));
    }

    #[test]
    fn test_caps_at_max_delay() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.delay(10), ms(1_024_000));
        assert_eq!(policy.delay(11), ms(1_024_000));
        assert_eq!(policy.delay(40), ms(1_024_000));
        assert_eq!(policy.delay(u32::MAX), ms(1_024_000));
    }

    #[test]
    fn test_matches_closed_form() {
        let initial = ms(250);
        let max = ms(60_000);
        for attempt in 0..20u32 {
            let expected = ms((250u64 << attempt).min(60_000));
            assert_eq!(backoff_delay(attempt, initial, max), expected, "attempt {attempt}");
        }
    }

    #[test]
    fn test_from_config() {
        let mut config = GatewayConfig::new("k");
        config.backoff_initial_ms = 10;
        config.backoff_max_ms = 35;
        let policy = ExponentialBackoff::from_config(&config);
        assert_eq!(policy.delay(0), ms(10));
        assert_eq!(policy.delay(1), ms(20));
        assert_eq!(policy.delay(2), ms(35));
    }

    #[tokio::test]
    async fn test_wait_returns_cancelled_when_token_fires() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait_or_cancel(Duration::from_secs(3600), &cancel).await;
        assert_eq!(result, Err(GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn test_wait_completes_without_cancellation() {
        let cancel = CancellationToken::new();
        assert_eq!(wait_or_cancel(Duration::ZERO, &cancel).await, Ok(()));
    }

    #[test]
    fn test_no_backoff_is_zero() {
        assert_eq!(NoBackoff.delay(0), Duration::ZERO);
        assert_eq!(NoBackoff.delay(9), Duration::ZERO);
    }
}
