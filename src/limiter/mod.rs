//! Per-caller admission control.
//!
//! ## Contents
//! - [`Admission`] the seam the pipeline depends on
//! - [`RateLimiter`] fixed-window implementation ([`RateLimitConfig`], [`RateLimitWindow`])
//! - [`RateDecision`] outcome of one check
//!
//! The limiter is consulted once per inbound request at the pipeline boundary, never
//! per retry attempt.

mod fixed;
mod window;

pub use fixed::{Admission, RateDecision, RateLimitConfig, RateLimiter};
pub use window::RateLimitWindow;
