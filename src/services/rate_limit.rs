// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-wide spacing between outbound provider requests.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum gap between two Google Fit requests.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Sequential gate: each `acquire` returns no earlier than `min_interval`
/// after the previous one returned.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Wait for the gate. The lock is held while sleeping so concurrent
    /// callers line up instead of all waking at once.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if Instant::now() < ready_at {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Rate limiting provider request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_REQUEST_INTERVAL)
    }
}
