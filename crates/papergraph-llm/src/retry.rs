//! Exponential backoff for rate-limited remote calls.
//!
//! Only rate-limit failures are retried. Anything else propagates on the first
//! attempt so malformed output or auth errors surface immediately.

use async_trait::async_trait;
use papergraph_config::RetrySettings;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::backend::LlmError;

/// Lowercase substrings that identify a throttled call in an error message.
///
/// A bare "rate" would match unrelated text such as the `generateContent`
/// path embedded in reqwest error messages.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "quota",
    "rate limit",
    "rate-limit",
    "rate_limit",
    "too many requests",
];

pub fn is_rate_limit_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Errors that can tell whether they represent a rate-limit rejection.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitSignal for LlmError {
    fn is_rate_limited(&self) -> bool {
        match self {
            LlmError::RateLimitExceeded(_) => true,
            LlmError::ApiError { status: 429, .. } => true,
            other => is_rate_limit_message(&other.to_string()),
        }
    }
}

/// Told about backoff so a caller (usually a job) can surface it.
#[async_trait]
pub trait RetryObserver: Send + Sync {
    async fn on_backoff(&self, attempt: u32, delay: Duration);
    async fn on_resume(&self);
}

pub struct NoopObserver;

#[async_trait]
impl RetryObserver for NoopObserver {
    async fn on_backoff(&self, _attempt: u32, _delay: Duration) {}
    async fn on_resume(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_retries, base_delay, max_delay }
    }

    /// 3 retries, 2s base, 60s cap.
    pub fn extraction() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(60))
    }

    /// 5 retries, 5s base, 60s cap.
    pub fn synthesis() -> Self {
        Self::new(5, Duration::from_secs(5), Duration::from_secs(60))
    }

    /// `min(base * 2^attempt, max)`, attempt counted from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `operation`, sleeping and retrying on rate-limit failures.
    ///
    /// Returns the last rate-limit error once retries are exhausted.
    pub async fn execute<F, Fut, T, E>(
        &self,
        observer: &dyn RetryObserver,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitSignal + Display,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(val) => return Ok(val),
                Err(e) if e.is_rate_limited() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Rate limit hit, backing off"
                    );
                    observer.on_backoff(attempt + 1, delay).await;
                    tokio::time::sleep(delay).await;
                    observer.on_resume().await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self::new(
            s.max_retries,
            delay_from_secs(s.base_delay_secs),
            delay_from_secs(s.max_delay_secs),
        )
    }
}

/// Unrepresentable values collapse to zero instead of panicking.
fn delay_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
}
