//! Request pacing for guide feeds.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const HOUR: Duration = Duration::from_secs(3600);

/// Two-tier rate limiter (minimum interval, hourly cap).
///
/// One limiter is shared by all stations of a provider so a burst of daily
/// refreshes does not hammer the feed.
#[derive(Debug)]
pub struct RequestLimiter {
    /// Minimum interval between requests.
    min_interval: Duration,
    /// Last request timestamp.
    last_request: Option<Instant>,
    /// Hourly request limit.
    hourly_limit: usize,
    /// Request timestamps within the last hour.
    hourly_window: VecDeque<Instant>,
}

impl RequestLimiter {
    /// Creates a new rate limiter.
    pub(crate) const fn new(min_interval: Duration, hourly_limit: usize) -> Self {
        Self {
            min_interval,
            last_request: None,
            hourly_limit,
            hourly_window: VecDeque::new(),
        }
    }

    /// Waits until the next request is allowed and records it.
    pub async fn wait(&mut self) {
        let now = Instant::now();
        self.cleanup_window(now);

        if let Some(last) = self.last_request {
            let elapsed = now.duration_since(last);
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval.saturating_sub(elapsed)).await;
            }
        }

        if self.hourly_window.len() >= self.hourly_limit
            && let Some(&oldest) = self.hourly_window.front()
            && let Some(wait_until) = oldest.checked_add(HOUR)
        {
            let remaining = wait_until.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                tracing::warn!(
                    remaining_secs = remaining.as_secs(),
                    "Hourly request limit reached. Waiting..."
                );
                tokio::time::sleep(remaining).await;
            }
        }

        let now = Instant::now();
        self.last_request = Some(now);
        self.hourly_window.push_back(now);
    }

    /// Removes expired entries from the hourly window.
    fn cleanup_window(&mut self, now: Instant) {
        if let Some(hour_ago) = now.checked_sub(HOUR) {
            while self.hourly_window.front().is_some_and(|&t| t < hour_ago) {
                self.hourly_window.pop_front();
            }
        }
    }
}
