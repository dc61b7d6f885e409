use crate::core::config::{duration_millis, ConfigError};
use crate::core::errors::KristError;
use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A request budget shared by every client that holds a clone of it
///
/// The service enforces its quota per process, not per connection, so one
/// limiter should be constructed at startup and cloned into each client.
/// Clones share the same token bucket for as long as any clone is alive.
/// Waiting for a token is backpressure, never an error.
///
/// The bucket runs on governor's own monotonic clock, so a paused tokio clock
/// (`start_paused`, `time::advance`) does not refill it; waits are wall-clock.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DefaultDirectRateLimiter>,
    requests: NonZeroU32,
    window: Duration,
}

impl RateLimiter {
    /// Allow `requests` requests per `window`, with the whole budget available as a burst
    pub fn new(requests: u32, window: Duration) -> Result<Self, KristError> {
        let requests = NonZeroU32::new(requests).ok_or_else(|| {
            ConfigError::InvalidConfiguration("Rate limit budget must be non-zero".to_string())
        })?;
        let period = window / requests.get();
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                ConfigError::InvalidConfiguration("Rate limit window must be non-zero".to_string())
            })?
            .allow_burst(requests);

        Ok(Self {
            inner: Arc::new(DefaultDirectRateLimiter::direct(quota)),
            requests,
            window,
        })
    }

    /// A limiter that practically never waits
    pub fn unlimited() -> Self {
        let requests = nonzero!(1_000_000u32);
        let quota = Quota::per_second(requests).allow_burst(requests);
        Self {
            inner: Arc::new(DefaultDirectRateLimiter::direct(quota)),
            requests,
            window: Duration::from_secs(1),
        }
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        if self.inner.check().is_err() {
            trace!(
                requests = self.requests.get(),
                window_ms = duration_millis(self.window),
                "rate limit budget exhausted, waiting"
            );
            self.inner.until_ready().await;
        }
    }

    /// Take a token without waiting; `false` if the budget is exhausted
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }

    pub fn budget(&self) -> (u32, Duration) {
        (self.requests.get(), self.window)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests", &self.requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_shared_between_clones() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60)).unwrap();
        let clone = limiter.clone();

        assert!(limiter.try_acquire());
        assert!(clone.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!clone.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            RateLimiter::new(0, Duration::from_secs(1)),
            Err(KristError::ConfigError(ConfigError::InvalidConfiguration(_)))
        ));
        assert!(matches!(
            RateLimiter::new(5, Duration::ZERO),
            Err(KristError::ConfigError(ConfigError::InvalidConfiguration(_)))
        ));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill_when_exhausted() {
        // 2 per 200ms: one token comes back every 100ms
        let limiter = RateLimiter::new(2, Duration::from_millis(200)).unwrap();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(!limiter.try_acquire());

        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(2), limiter.acquire())
            .await
            .expect("token should come back after one period");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(50), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(1), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_acquire_within_budget_does_not_wait() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60)).unwrap();
        for _ in 0..10 {
            tokio::time::timeout(Duration::from_secs(1), limiter.acquire())
                .await
                .expect("token should be available");
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_unlimited() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..1000 {
            assert!(limiter.try_acquire());
        }
    }
}
