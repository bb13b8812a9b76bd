use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::contracts::RetryConfig;
use crate::version::errors::{VersionError, VersionResult};

/// Exponential backoff with symmetric jitter.
///
/// Retry `n` (0-based) waits `base * factor^n`, capped at `max_delay`, then scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    rng_state: AtomicU64,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self::with_seed(config, seed)
    }

    pub fn with_seed(config: RetryConfig, seed: u64) -> Self {
        Self {
            config,
            // xorshift must never hold zero
            rng_state: AtomicU64::new(seed | 1),
        }
    }

    pub fn should_retry(&self, error: &VersionError, retry: u32) -> bool {
        retry < self.config.max_retries && error.is_retryable()
    }

    /// Delay before retry `retry` without jitter
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let base = Duration::from_millis(self.config.base_delay_ms);
        let max = Duration::from_millis(self.config.max_delay_ms);
        let scale = self.config.factor.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = base.as_millis() as f64 * scale;
        if !millis.is_finite() || millis >= max.as_millis() as f64 {
            return max;
        }
        Duration::from_millis(millis as u64).min(max)
    }

    /// Apply jitter to `delay`; `unit` is a uniform sample in `[0, 1]`
    pub fn jittered(&self, delay: Duration, unit: f64) -> Duration {
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let scale = 1.0 + jitter * (2.0 * unit.clamp(0.0, 1.0) - 1.0);
        delay.mul_f64(scale)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.jittered(self.base_delay_for(retry), self.next_unit())
    }

    fn next_unit(&self) -> f64 {
        let mut state = self.rng_state.load(Ordering::Relaxed);
        loop {
            let mut next = state;
            next ^= next << 13;
            next ^= next >> 7;
            next ^= next << 17;
            match self
                .rng_state
                .compare_exchange_weak(state, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return (next >> 11) as f64 / (1u64 << 53) as f64,
                Err(current) => state = current,
            }
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    ///
    /// Exhaustion is reported as `UpstreamUnavailable`; any other error is returned as is.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> VersionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VersionResult<T>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if !self.should_retry(&err, retry) => {
                    let message = match err {
                        VersionError::UpstreamUnavailable(message) => message,
                        other => other.to_string(),
                    };
                    debug!(label, retries = retry, "retries exhausted");
                    return Err(VersionError::UpstreamUnavailable(format!(
                        "{} failed after {} retries: {}",
                        label, retry, message
                    )));
                }
                Err(err) => {
                    let delay = self.delay_for(retry);
                    warn!(label, retry = retry + 1, ?delay, error = %err, "retrying upstream request");
                    sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
