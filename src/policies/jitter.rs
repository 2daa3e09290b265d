//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that many callers hitting the
//! same transient condition (a momentarily overloaded store) do not retry in lockstep.
//!
//! - [`JitterPolicy::None`] no randomization, predictable delays
//! - [`JitterPolicy::Spread`] delay × (1 ± ratio), uniform (default: ±25%)
//! - [`JitterPolicy::Full`] random delay in [0, delay]
//! - [`JitterPolicy::Equal`] delay/2 + random[0, delay/2]

use rand::Rng;
use std::time::Duration;

/// Default spread ratio used by [`JitterPolicy::default`].
pub const DEFAULT_SPREAD: f64 = 0.25;

/// Policy controlling randomization of retry delays.
///
/// ## Trade-offs
/// - **None**: predictable, but risks synchronized retry storms
/// - **Spread**: keeps the mean delay, only perturbs it (recommended)
/// - **Full**: maximum randomness, can shorten delays significantly
/// - **Equal**: keeps at least half of the delay
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    None,

    /// Symmetric jitter: `delay × (1 + u)`, `u` uniform in `[-ratio, ratio]`.
    ///
    /// The ratio is clamped to `[0.0, 1.0]`; the result is floored at zero.
    Spread(f64),

    /// Full jitter: random delay in [0, delay].
    Full,

    /// Equal jitter: delay/2 + random[0, delay/2].
    Equal,
}

impl Default for JitterPolicy {
    /// Returns [`JitterPolicy::Spread`] with a ±25% ratio.
    fn default() -> Self {
        JitterPolicy::Spread(DEFAULT_SPREAD)
    }
}

impl JitterPolicy {
    /// Applies jitter to the given delay using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with(delay, &mut rand::rng())
    }

    /// Applies jitter to the given delay using an injected random source.
    pub fn apply_with<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match *self {
            JitterPolicy::None => delay,
            JitterPolicy::Spread(ratio) => spread_jitter(delay, ratio, rng),
            JitterPolicy::Full => full_jitter(delay, rng),
            JitterPolicy::Equal => equal_jitter(delay, rng),
        }
    }

    /// Upper bound of what [`apply`](Self::apply) can return for `delay`.
    pub fn upper_bound(&self, delay: Duration) -> Duration {
        match *self {
            JitterPolicy::Spread(ratio) if ratio.is_finite() && ratio > 0.0 => {
                delay.mul_f64(1.0 + ratio.min(1.0))
            }
            _ => delay,
        }
    }
}

/// delay × (1 ± ratio), floored at zero.
fn spread_jitter<R: Rng + ?Sized>(delay: Duration, ratio: f64, rng: &mut R) -> Duration {
    if !ratio.is_finite() || ratio <= 0.0 || delay.is_zero() {
        return delay;
    }
    let ratio = ratio.min(1.0);
    let factor = 1.0 + rng.random_range(-ratio..=ratio);
    let secs = delay.as_secs_f64() * factor;
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs)
}

/// random[0, delay]
fn full_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..=ms))
}

/// delay/2 + random[0, delay/2]
fn equal_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let jitter = if half == 0 {
        0
    } else {
        rng.random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}
