use std::time::Duration;

/// Fixed minimum spacing between consecutive external calls
///
/// Queues are drained by a single sequential flow, so sleeping in that flow
/// is enough to space out every call it makes.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    interval: Duration,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// A limiter that never waits
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn throttle(&self) {
        if self.interval.is_zero() {
            return;
        }
        tracing::trace!(interval_ms = self.interval.as_millis() as u64, "Throttling");
        tokio::time::sleep(self.interval).await;
    }
}
