//! Pacing for outbound Telegram calls.
//!
//! Keeps a minimum spacing between sends, forwards and deletions, and holds
//! every caller back while a FLOOD_WAIT penalty from Telegram is running.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Window {
    /// Last time an operation was let through.
    last_operation: Option<Instant>,

    /// End of the current flood-wait penalty.
    blocked_until: Option<Instant>,
}

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    window: Mutex<Window>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            window: Mutex::new(Window::default()),
        }
    }

    /// Waits until an operation is allowed, then marks the operation as performed.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut window = self.window.lock().await;

        let wait_duration = Self::remaining(&window, self.min_interval, Instant::now());
        if !wait_duration.is_zero() {
            debug!("Rate limiter: waiting {:?} before next operation", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        window.last_operation = Some(Instant::now());
        window.blocked_until = None;
        wait_duration
    }

    /// Returns the time remaining until the next operation is allowed.
    pub async fn time_until_allowed(&self) -> Duration {
        let window = self.window.lock().await;
        Self::remaining(&window, self.min_interval, Instant::now())
    }

    /// Blocks further operations for the penalty Telegram asked for.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Received flood wait from Telegram: {} seconds", wait_seconds);

        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        let mut window = self.window.lock().await;
        window.blocked_until = Some(window.blocked_until.map_or(until, |b| b.max(until)));
    }

    fn remaining(window: &Window, min_interval: Duration, now: Instant) -> Duration {
        let spacing = window
            .last_operation
            .map_or(Duration::ZERO, |last| {
                min_interval.saturating_sub(now.saturating_duration_since(last))
            });
        let penalty = window
            .blocked_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now));
        spacing.max(penalty)
    }
}
