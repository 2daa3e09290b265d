//! Retry policies and failure classification.
//!
//! This module groups the knobs that control **whether** a failed attempt is repeated
//! and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`] attempts limit, backoff, retryable codes, per-attempt timeout
//! - [`BackoffPolicy`] how retry delays evolve (base / multiplier / max + jitter)
//! - [`JitterPolicy`] randomization strategy to avoid synchronized retries
//! - [`is_retryable`] classification of an [`OperationError`](crate::OperationError)
//!
//! ## Quick wiring
//! ```text
//! RetryPolicy { max_attempts, backoff, retryable_codes, attempt_timeout }
//!      └─► core::orchestrator uses:
//!           - is_retryable(err, retryable_codes) to decide continue/fail
//!           - backoff.delay(attempt) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 3 attempts, no timeout.
//! - `BackoffPolicy::default()` → base=1s, multiplier=2.0, max=30s, jitter=±25%.
//! - `RetryableCodes::default()` → 408, 429, 500, 502, 503, 504.

mod backoff;
mod classify;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use classify::{DEFAULT_RETRYABLE_CODES, RetryableCodes, TRANSIENT_PHRASES, is_retryable};
pub use jitter::{DEFAULT_SPREAD, JitterPolicy};
pub use retry::RetryPolicy;
