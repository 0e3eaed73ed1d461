//! Request spacing shared by concurrent detail fetches

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Fixed-interval limiter
///
/// Callers take turns: each turn starts at least `interval` after the
/// previous one. Waiters queue on the mutex, so the spacing holds no matter
/// how many tasks arrive at once.
#[derive(Debug)]
pub struct RequestGate {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the caller may start a request
    ///
    /// Returns `false` if the token was cancelled while waiting; the turn is
    /// not consumed in that case.
    pub async fn wait_turn(&self, cancel: &CancellationToken) -> bool {
        let mut last = self.last_request.lock().await;

        if let Some(wait) = time_until_next_request(*last, self.interval, Instant::now()) {
            tracing::debug!("Request gate: waiting {:?}", wait);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep(wait) => {}
            }
        }

        if cancel.is_cancelled() {
            return false;
        }

        *last = Some(Instant::now());
        true
    }
}

/// Time left before the next request may start, or `None` if it may start now
fn time_until_next_request(
    last: Option<Instant>,
    interval: Duration,
    now: Instant,
) -> Option<Duration> {
    let elapsed = now.duration_since(last?);
    if elapsed < interval {
        Some(interval - elapsed)
    } else {
        None
    }
}
