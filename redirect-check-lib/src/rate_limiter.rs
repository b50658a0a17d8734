//! Admission throttling.
//!
//! A token bucket with burst 1: at most `rate` rows per second enter the
//! pipeline, evenly spaced. It only gates admission; rows already queued or
//! being verified are not slowed down by it.

use crate::error::AdmissionError;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct AdmissionLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    timeout: Duration,
}

impl AdmissionLimiter {
    /// `rate_per_second` of zero is treated as one.
    pub fn new(rate_per_second: u32, timeout: Duration) -> Self {
        let rate = NonZeroU32::new(rate_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(quota),
            timeout,
        }
    }

    /// Wait for one admission token.
    ///
    /// Fails with [`AdmissionError::Cancelled`] as soon as `cancel` fires, or
    /// with [`AdmissionError::TimedOut`] when no token shows up in time.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AdmissionError> {
        if cancel.is_cancelled() {
            return Err(AdmissionError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdmissionError::Cancelled),
            ready = tokio::time::timeout(self.timeout, self.limiter.until_ready()) => {
                ready
                    .map(|_| ())
                    .map_err(|_| AdmissionError::TimedOut(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_token_is_immediate() {
        let limiter = AdmissionLimiter::new(1, Duration::from_secs(5));
        let token = CancellationToken::new();

        let start = Instant::now();
        assert!(limiter.acquire(&token).await.is_ok());
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_tokens_are_spaced_without_burst() {
        let limiter = AdmissionLimiter::new(20, Duration::from_secs(5));
        let token = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire(&token).await.unwrap();
        }
        // 1 immediate + 3 spaced at 50ms
        assert!(start.elapsed() >= Duration::from_millis(140));
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_fast() {
        let limiter = AdmissionLimiter::new(1, Duration::from_secs(5));
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(limiter.acquire(&token).await, Err(AdmissionError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let limiter = AdmissionLimiter::new(1, Duration::from_secs(30));
        let token = CancellationToken::new();
        limiter.acquire(&token).await.unwrap();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        assert_eq!(limiter.acquire(&token).await, Err(AdmissionError::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_timeout() {
        let timeout = Duration::from_millis(50);
        let limiter = AdmissionLimiter::new(1, timeout);
        let token = CancellationToken::new();
        limiter.acquire(&token).await.unwrap();

        assert_eq!(
            limiter.acquire(&token).await,
            Err(AdmissionError::TimedOut(timeout))
        );
    }

    #[tokio::test]
    async fn test_zero_rate_still_admits() {
        let limiter = AdmissionLimiter::new(0, Duration::from_secs(1));
        assert!(limiter.acquire(&CancellationToken::new()).await.is_ok());
    }
}
