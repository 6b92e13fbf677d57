//! Client-side request pacing.
//!
//! The upstream providers meter requests per second (Keepa 0.5 rps, SP-API
//! and Rakuten 1 rps). Pacing on our side keeps the adapters from burning
//! their retry budget on avoidable 429s.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between requests across concurrent callers.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Build a pacer from a requests-per-second budget. A non-positive rate
    /// disables pacing.
    pub fn from_rps(rps: f64) -> Self {
        let min_interval = if rps > 0.0 {
            Duration::from_secs_f64(1.0 / rps)
        } else {
            Duration::ZERO
        };
        RequestPacer {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request slot is available, then claim it.
    ///
    /// The slot is claimed while holding the lock, so concurrent callers
    /// line up instead of bursting together.
    pub async fn pace(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        let now = Instant::now();
        let ready_at = match *last {
            Some(prev) => prev + self.min_interval,
            None => now,
        };
        if ready_at > now {
            tokio::time::sleep(ready_at - now).await;
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_pacer_does_not_wait() {
        let pacer = RequestPacer::from_rps(0.0);
        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pacer_spaces_requests() {
        let pacer = RequestPacer::from_rps(20.0); // 50ms interval
        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_first_request_is_not_delayed() {
        let pacer = RequestPacer::from_rps(2.0);
        let start = Instant::now();
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
