//! # Retry policy for orchestrated operations.
//!
//! [`RetryPolicy`] bundles everything the orchestrator needs to drive one logical
//! operation: how many attempts, how long to wait between them, which failures are
//! transient, and an optional per-attempt timeout.
//!
//! Numeric defaults are configuration, not constants: call sites override them.
//! [`RetryPolicy::critical`] and [`RetryPolicy::background`] are two common presets.

use std::time::Duration;

use crate::policies::{backoff::BackoffPolicy, classify::RetryableCodes, jitter::JitterPolicy};

/// Policy controlling how one logical operation is retried.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (`0` is treated as `1`).
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Status codes considered transient.
    pub retryable_codes: RetryableCodes,
    /// Optional per-attempt timeout (`None` = no timeout).
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    /// Returns a policy with:
    /// - `max_attempts = 3`;
    /// - `backoff = BackoffPolicy::default()` (1s base, ×2, 30s cap, ±25% jitter);
    /// - default retryable codes;
    /// - no per-attempt timeout.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            retryable_codes: RetryableCodes::default(),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Policy for high-value operations (final submissions): more attempts, longer ceiling.
    pub fn critical() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1000),
                max: Duration::from_secs(60),
                multiplier: 2.0,
                jitter: JitterPolicy::default(),
            },
            ..Self::default()
        }
    }

    /// Policy for cheap, replaceable operations (draft saves): few attempts, short ceiling.
    pub fn background() -> Self {
        Self {
            max_attempts: 2,
            backoff: BackoffPolicy {
                base: Duration::from_millis(500),
                max: Duration::from_secs(5),
                multiplier: 2.0,
                jitter: JitterPolicy::default(),
            },
            ..Self::default()
        }
    }

    /// Returns the effective attempt limit (never zero).
    #[inline]
    pub fn attempts_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns the per-attempt timeout, treating `0s` as no timeout.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.attempt_timeout.filter(|d| *d > Duration::ZERO)
    }

    /// Returns a new policy with updated attempt limit.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns a new policy with updated backoff.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns a new policy with updated retryable codes.
    pub fn with_retryable_codes(mut self, codes: RetryableCodes) -> Self {
        self.retryable_codes = codes;
        self
    }

    /// Returns a new policy with updated per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}
