//! Duplicate-side-effect suppression.
//!
//! ## Contents
//! - [`IdempotencyKey`] deterministic identifier of a logical operation
//! - [`NaturalKey`] which payload fields make up the business-level key
//! - [`IdempotencyCache`], [`IdempotencyEntry`] time-bounded first-writer-wins store
//!
//! ```text
//! Submission ──► NaturalKey::resolve ──► IdempotencyKey::derive ──► orchestrator
//!                                                                    │
//!                                                 get(key) hit ◄─────┤ replay cached result
//!                                                 put(key) on success┘
//! ```

mod cache;
mod key;

pub use cache::{IdempotencyCache, IdempotencyEntry};
pub use key::{IdempotencyKey, NaturalKey};
