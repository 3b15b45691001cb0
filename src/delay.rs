use rand::Rng;

use crate::RequestError;

/// Base delay used by [`exponential_delay`].
pub const DEFAULT_DELAY_FACTOR_MS: u64 = 100;

/// Computes how long to wait before the next attempt.
pub trait RetryDelay: Send + Sync {
    /// Delay in milliseconds before retry number `retry_count` (starting at 1).
    fn delay_ms(&self, retry_count: u32, error: &RequestError) -> u64;
}

impl<F> RetryDelay for F
where
    F: Fn(u32, &RequestError) -> u64 + Send + Sync,
{
    fn delay_ms(&self, retry_count: u32, error: &RequestError) -> u64 {
        self(retry_count, error)
    }
}

/// Retries immediately.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoDelay;

impl RetryDelay for NoDelay {
    fn delay_ms(&self, _retry_count: u32, _error: &RequestError) -> u64 {
        0
    }
}

/// Exponential backoff with up to 20% random jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialDelay {
    /// Delay for retry number zero, doubled for every following retry.
    pub delay_factor_ms: u64,
}

impl Default for ExponentialDelay {
    fn default() -> Self {
        Self {
            delay_factor_ms: DEFAULT_DELAY_FACTOR_MS,
        }
    }
}

impl RetryDelay for ExponentialDelay {
    fn delay_ms(&self, retry_count: u32, _error: &RequestError) -> u64 {
        exponential_delay_with_factor(retry_count, self.delay_factor_ms)
    }
}

/// Always `0`.
pub fn no_delay(_retry_count: u32) -> u64 {
    0
}

/// `2^n * 100` milliseconds plus jitter in `[0, 20%)`.
///
/// `None` is treated as retry number zero.
pub fn exponential_delay(retry_number: impl Into<Option<u32>>) -> u64 {
    exponential_delay_with_factor(retry_number.into().unwrap_or(0), DEFAULT_DELAY_FACTOR_MS)
}

/// `2^n * delay_factor_ms` milliseconds plus jitter in `[0, 20%)`.
pub fn exponential_delay_with_factor(retry_number: u32, delay_factor_ms: u64) -> u64 {
    let base = 2f64.powf(f64::from(retry_number)) * delay_factor_ms as f64;
    if !base.is_finite() || base <= 0.0 {
        // Saturating float-to-int cast keeps huge exponents at u64::MAX.
        return base as u64;
    }
    let jitter = rand::thread_rng().gen_range(0.0..base * 0.2);
    (base + jitter) as u64
}
