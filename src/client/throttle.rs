//! Request spacing for the remote API.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Single-slot throttle.
///
/// Guarantees at least `min_interval` between the starts of two consecutive
/// requests. There is no burst capacity: a caller arriving early waits out
/// the remainder of the interval while holding the slot, so concurrent
/// callers are serialized.
#[derive(Debug)]
pub struct RequestThrottle {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may start, then record its start time.
    pub async fn wait(&self) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if Instant::now() < ready_at {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Throttling API request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}
