//! Request pacing and retry backoff.
//!
//! The limiter owns the only shared mutable state in a client: the timestamp
//! of the last outbound request. [`RateLimiter::acquire`] reads it, sleeps out
//! any remaining delay, and writes the new timestamp — all while holding one
//! async mutex, so two tasks can never both observe a stale timestamp and
//! proceed without waiting. That single critical section is the correctness
//! core of the whole rate-limiting story.
//!
//! Both waits in this crate — the pacing wait here and the retry backoff in
//! the dispatcher — are `tokio::time::sleep` suspension points. They park the
//! calling task, never an OS thread, so the limiter behaves correctly on a
//! multi-threaded runtime and on a single-threaded cooperative one alike.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Paces outbound requests and computes retry backoff for one client.
#[derive(Debug)]
pub struct RateLimiter {
    request_delay: Duration,
    max_retries: u32,
    retry_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter.
    ///
    /// * `request_delay` — minimum spacing between any two requests issued
    ///   through this limiter. Zero disables pacing entirely.
    /// * `max_retries` — retries allowed on HTTP 429 (0 = fail on first 429).
    /// * `retry_delay` — base backoff; attempt `n` waits `retry_delay * 2^n`.
    pub fn new(request_delay: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            request_delay,
            max_retries,
            retry_delay,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until at least `request_delay` has passed since the previous
    /// `acquire` completed, then record the new last-request time.
    ///
    /// The lock is held across the sleep on purpose: releasing it before
    /// updating the timestamp would let a second caller compute its delay
    /// from the stale value and skip waiting.
    pub async fn acquire(&self) {
        if self.request_delay.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!("Rate limiting: waiting {:?} before next request", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Backoff before retry number `attempt` (0-indexed):
    /// `retry_delay * 2^attempt`. Pure; no state is touched.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt)
    }

    /// Whether a 429 on `attempt` (0-indexed) should be retried.
    pub fn should_retry(&self, attempt: u32, enabled: bool) -> bool {
        enabled && attempt < self.max_retries
    }

    /// Maximum number of 429 retries configured.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
