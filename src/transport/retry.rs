//! Retry backoff strategies for the transport layer's badNonce/5xx retries.

use std::time::Duration;

/// A backoff schedule.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    ExponentialBackoff {
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
    LinearBackoff {
        initial_delay: Duration,
        increment: Duration,
    },
    FixedDelay(Duration),
    NoRetry,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Delay before the Nth retry attempt (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(attempt as i32);
                let delay = Duration::from_millis(delay_ms as u64);
                delay.min(*max_delay)
            }
            RetryStrategy::LinearBackoff {
                initial_delay,
                increment,
            } => initial_delay.saturating_add(increment.saturating_mul(attempt)),
            RetryStrategy::FixedDelay(delay) => *delay,
            RetryStrategy::NoRetry => Duration::ZERO,
        }
    }
}

/// Retry policy applied to transport-level failures: badNonce (treated as a
/// 400-class retry) and 5xx without an explicit `Retry-After`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    pub retry_on_client_error: bool,
    pub retry_on_server_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: RetryStrategy::default(),
            retry_on_client_error: false,
            retry_on_server_error: true,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, status_code: u16, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        match status_code {
            400..=499 => self.retry_on_client_error,
            500..=599 => self.retry_on_server_error,
            _ => false,
        }
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.strategy.delay(attempt)
    }
}
