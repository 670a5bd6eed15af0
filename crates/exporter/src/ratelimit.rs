//! Process-wide admission gate for outbound API calls.
//!
//! Leaky-bucket limiter: slots are handed out `1/N` seconds apart in the
//! order callers reach the internal lock, which tokio's mutex grants FIFO.
//! Waiting is the intended backpressure, never an error.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Waits longer than this are logged.
const SLOW_WAIT_THRESHOLD: Duration = Duration::from_millis(250);

/// Admits at most `N` operations per second across every holder of the limiter.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    /// Earliest instant the next slot may be handed out.
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// `per_second` is clamped to at least 1.
    pub fn new(per_second: u32) -> Self {
        let per_second = per_second.max(1);
        Self {
            interval: Duration::from_secs(1) / per_second,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Spacing between two consecutive slots.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until a slot is available.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.interval;
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if wait > SLOW_WAIT_THRESHOLD {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter delaying request");
        }
        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn interval_from_rate() {
        assert_eq!(RateLimiter::new(10).interval(), Duration::from_millis(100));
        assert_eq!(RateLimiter::new(1).interval(), Duration::from_secs(1));
        // zero is treated as one
        assert_eq!(RateLimiter::new(0).interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sequential_calls_are_spaced() {
        let limiter = RateLimiter::new(20);
        let start = std::time::Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        // (K - 1) / N = 4 / 20
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn concurrent_calls_share_the_budget() {
        let limiter = Arc::new(RateLimiter::new(10));
        let start = std::time::Instant::now();
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn first_call_is_immediate() {
        let limiter = RateLimiter::new(1);
        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
