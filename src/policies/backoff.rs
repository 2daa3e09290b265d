//! # Backoff policy for retried operations.
//!
//! [`BackoffPolicy`] controls how retry delays grow after repeated failures.
//! It is parameterized by:
//! - [`BackoffPolicy::base`] the delay after the first failed attempt;
//! - [`BackoffPolicy::multiplier`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay after attempt `n` (1-based) is `base × multiplier^(n-1)`, clamped to `max`,
//! then jitter is applied. The base delay is derived purely from the attempt number, so
//! jitter output never feeds back into later calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use submitvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     base: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     multiplier: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! // 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(backoff.delay(11), Duration::from_secs(10));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay scheduled after the first failed attempt.
    pub base: Duration,
    /// Maximum delay cap (applied before jitter).
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub multiplier: f64,
    /// Jitter policy to prevent synchronized retries.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `base = 1s`;
    /// - `max = 30s`;
    /// - `multiplier = 2.0`;
    /// - `jitter = ±25%`.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: JitterPolicy::default(),
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay to wait after the given failed attempt (1-based).
    ///
    /// Attempt `0` is treated as `1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base_delay(attempt))
    }

    /// Same as [`delay`](Self::delay) with an injected random source.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.jitter.apply_with(self.base_delay(attempt), rng)
    }

    /// The un-jittered delay: `min(max, base × multiplier^(attempt-1))`.
    ///
    /// # Notes
    /// - Non-finite or negative intermediate values clamp to `max`.
    /// - With `multiplier == 1.0` the delay stays at `base` (up to `max`).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max.as_secs_f64();
        let unclamped_secs = self.base.as_secs_f64() * self.multiplier.powi(exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }

    /// Sum of un-jittered delays scheduled between `attempts` attempts.
    ///
    /// Useful to reason about the worst-case time a caller may wait.
    pub fn total_base_delay(&self, attempts: u32) -> Duration {
        (1..attempts).map(|n| self.base_delay(n)).sum()
    }
}
