//! # Fixed-window rate limiter.
//!
//! The first request of a caller opens a window of fixed length; every request inside
//! the window increments a counter; a request is admitted iff the post-increment counter
//! is `<= limit`. When the window has elapsed, the next check resets it **inside the same
//! call**, so the check is the only mutator of a caller's state.
//!
//! ```text
//! check_and_consume("10.0.0.7")
//!   └─► DashMap::entry(caller)                ── shard lock held (sync code only)
//!         ├─ vacant   → open window, count=1
//!         └─ occupied → elapsed? reset : keep
//!                       count += 1
//!   └─► RateDecision { allowed: count <= limit, remaining, reset_at }
//! ```
//!
//! Slight burstiness at window boundaries is accepted in exchange for one counter per
//! caller; a sliding-window or token-bucket implementation of [`Admission`] can be
//! dropped in without affecting callers.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::window::RateLimitWindow;

/// Outcome of one admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Admissions left in the current window.
    pub remaining: u32,
    /// When the caller's window resets.
    pub reset_at: Instant,
    /// Configured per-window limit.
    pub limit: u32,
}

impl RateDecision {
    /// Time left until the window resets (zero if already past).
    pub fn retry_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }
}

/// Per-caller admission control.
///
/// Implementations must perform the check and the state update as one atomic step
/// per caller key, and must keep distinct keys independent.
pub trait Admission: Send + Sync + 'static {
    /// Counts one request for `caller_key` and reports whether it is admitted.
    fn check_and_consume(&self, caller_key: &str) -> RateDecision;

    /// Discards state that can no longer affect a decision. Returns entries removed.
    fn sweep(&self) -> usize;
}

/// Rate limiter configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Admitted requests per window (`0` denies everything).
    pub limit: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    /// `30` requests per `60s` window.
    fn default() -> Self {
        Self {
            limit: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Fixed-window counter store, one window per caller key.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Snapshot of a caller's window, if one exists.
    pub fn window(&self, caller_key: &str) -> Option<RateLimitWindow> {
        self.windows.get(caller_key).map(|w| w.clone())
    }

    /// Number of tracked callers.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// True if no caller is tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Admission for RateLimiter {
    fn check_and_consume(&self, caller_key: &str) -> RateDecision {
        let now = Instant::now();
        let mut window = self
            .windows
            .entry(caller_key.to_owned())
            .or_insert_with(|| RateLimitWindow::open(now, self.config.limit, self.config.window));

        let allowed = window.consume(now);
        RateDecision {
            allowed,
            remaining: window.remaining(),
            reset_at: window.reset_at(),
            limit: window.limit,
        }
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_elapsed(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(limit: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            limit,
            window: Duration::from_millis(window_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_plus_one_is_denied() {
        let rl = limiter(3, 1000);
        for expected_remaining in [2, 1, 0] {
            let d = rl.check_and_consume("ip-1");
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }
        let denied = rl.check_and_consume("ip-1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_elapsing() {
        let rl = limiter(2, 1000);
        rl.check_and_consume("ip-1");
        rl.check_and_consume("ip-1");
        assert!(!rl.check_and_consume("ip-1").allowed);

        tokio::time::advance(Duration::from_millis(1000)).await;
        let d = rl.check_and_consume("ip-1");
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
        assert_eq!(rl.window("ip-1").map(|w| w.count), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_are_independent() {
        let rl = limiter(1, 1000);
        assert!(rl.check_and_consume("a").allowed);
        assert!(!rl.check_and_consume("a").allowed);
        assert!(rl.check_and_consume("b").allowed);
        assert_eq!(rl.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_denies_everything() {
        let rl = limiter(0, 1000);
        assert!(!rl.check_and_consume("a").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_discards_elapsed_windows() {
        let rl = limiter(5, 1000);
        rl.check_and_consume("old");
        tokio::time::advance(Duration::from_millis(600)).await;
        rl.check_and_consume("fresh");
        tokio::time::advance(Duration::from_millis(500)).await;

        assert_eq!(rl.sweep(), 1);
        assert!(rl.window("old").is_none());
        assert!(rl.window("fresh").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_limit() {
        let rl = Arc::new(limiter(10, 60_000));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move { rl.check_and_consume("hot").allowed }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.expect("join") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
