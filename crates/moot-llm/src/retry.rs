use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use moot_core::config::RetryConfig;
use moot_core::error::Result;
use moot_core::traits::Generator;
use moot_core::types::GenerationRequest;

/// Exponential backoff for rate-limited calls. No jitter: the same policy
/// always produces the same sequence of waits.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Waits between consecutive attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let max_ms = self.max_delay.as_millis() as f64;
        let mut delay_ms = self.initial_delay.as_millis() as f64;
        (1..self.max_attempts.max(1)).map(move |_| {
            let wait = delay_ms.min(max_ms).max(0.0);
            // Capping here keeps the float finite without changing any wait
            delay_ms = (delay_ms * self.multiplier).min(max_ms);
            Duration::from_millis(wait as u64)
        })
    }
}

/// Run `op` until it succeeds, fails with something other than a rate limit,
/// or runs out of attempts. Only the calling task sleeps during backoff.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = policy.delays();
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limit() => match delays.next() {
                Some(backoff) => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Rate limited, retrying generation"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                None => {
                    warn!(attempt, error = %e, "Retry attempts exhausted");
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}

/// A generator that retries rate-limited requests with [`with_backoff`].
pub struct RetryingGenerator {
    inner: Box<dyn Generator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Box<dyn Generator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl Generator for RetryingGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            with_backoff(&self.policy, || self.inner.generate(request.clone())).await
        })
    }
}
