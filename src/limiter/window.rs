use std::time::Duration;

use tokio::time::Instant;

/// Per-caller fixed window state.
#[derive(Clone, Debug)]
pub struct RateLimitWindow {
    /// When the current window opened.
    pub window_start: Instant,
    /// Requests counted in the current window (including denied ones).
    pub count: u32,
    /// Maximum admitted requests per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimitWindow {
    pub(super) fn open(now: Instant, limit: u32, window: Duration) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit,
            window,
        }
    }

    /// Instant at which the window resets.
    #[inline]
    pub fn reset_at(&self) -> Instant {
        self.window_start + self.window
    }

    /// True once the window elapsed.
    #[inline]
    pub fn is_elapsed(&self, now: Instant) -> bool {
        now >= self.reset_at()
    }

    /// Resets the window if it elapsed, then counts one request.
    ///
    /// Returns whether the request is admitted.
    pub(super) fn consume(&mut self, now: Instant) -> bool {
        if self.is_elapsed(now) {
            self.window_start = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.limit
    }

    /// Admissions left in the current window.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}
