//! Requests-per-second limiter shared by every caller of the upstream API
//!
//! The limiter counts requests inside a one-second window. Once the window's
//! budget is spent, the next caller sleeps until the window resets instead of
//! failing. The window state sits behind an async mutex, so concurrent crawl
//! workers draw from a single budget and a waiting caller holds the others back.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
struct WindowState {
    started: Instant,
    count: u32,
}

/// Rolling-window request limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` calls per second
    pub fn new(requests_per_second: u32) -> Self {
        Self::with_window(requests_per_second, Duration::from_secs(1))
    }

    /// Creates a limiter with a custom window length
    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Requests allowed per window
    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Waits until a request slot is available and claims it
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count >= self.max_per_window {
            let reset_at = state.started + self.window;
            tracing::trace!(
                wait_ms = reset_at.saturating_duration_since(now).as_millis() as u64,
                "Request budget exhausted, waiting for window reset"
            );
            sleep_until(reset_at).await;
            state.started = Instant::now();
            state.count = 0;
        }

        state.count += 1;
    }
}
