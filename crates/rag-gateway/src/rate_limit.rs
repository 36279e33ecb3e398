//! Sliding-window admission control.
//!
//! One [`RateLimiter`] belongs to one client instance. Every call made through
//! that client shares its window, so pruning, counting and recording happen
//! under a single lock.

use crate::error::{GatewayError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter over a trailing time window.
///
/// `check` rejects with [`GatewayError::RateLimitExceeded`] once `max_requests`
/// calls fall inside the window. Rejected calls are not recorded. There is no
/// queueing: callers either get in or get the wait time back.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admits or rejects one call.
    pub fn check(&self) -> Result<()> {
        let now = Instant::now();
        let mut timestamps = self
            .timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Self::prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            let wait = timestamps
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            tracing::debug!(
                in_window = timestamps.len(),
                max_requests = self.max_requests,
                wait_ms = wait.as_millis() as u64,
                "rate limit reached"
            );
            return Err(GatewayError::RateLimitExceeded {
                wait_seconds: wait.as_secs_f64(),
            });
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Number of calls currently inside the window.
    pub fn in_window(&self) -> usize {
        let mut timestamps = self
            .timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::prune(&mut timestamps, Instant::now(), self.window);
        timestamps.len()
    }

    // Timestamps are pushed in order, so expired entries are always at the front.
    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}
