//! # submitvisor
//!
//! **Submitvisor** is a resilient, idempotent submission pipeline for async Rust.
//!
//! It accepts client-submitted records (one at a time or in bounded batches),
//! protects the backing store from overload, guarantees at most one logical effect
//! per client operation under retries, and reports granular per-item outcomes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        submit / submit_batch / execute / process_batch
//!                              │
//! ┌────────────────────────────▼──────────────────────────────────────┐
//! │  Pipeline (boundary, owns shared state)                           │
//! │  - Admission (RateLimiter: fixed window per caller)               │
//! │  - IdempotencyCache (first writer wins, TTL, periodic sweep)      │
//! │  - BatchCoordinator (chunks of max_concurrency, isolated items)   │
//! │  - RetryOrchestrator (attempts, backoff, classification, replay)  │
//! └──────┬───────────────────────────────────────────────┬────────────┘
//!        │ operation(token) per attempt                  │ publishes
//!        ▼                                               ▼
//!   RecordStore / caller closure         ┌───────────────────────────────┐
//!                                        │   Bus (broadcast channel)     │
//!                                        └───────────────┬───────────────┘
//!                                                        ▼
//!                                              subscriber_listener
//!                                                        ▼
//!                                                  SubscriberSet
//!                                           ┌────────────┼────────────┐
//!                                           ▼            ▼            ▼
//!                                       LogWriter     metrics      custom
//! ```
//!
//! ### Lifecycle of one operation
//! ```text
//! execute(operation, policy, key)
//!
//! loop {
//!   ├─► cache.get(key)  hit ─► IdempotentReplay, return cached value
//!   ├─► attempt += 1, publish AttemptStarting
//!   ├─► run_once(operation, attempt_timeout)
//!   │       ├─ Ok  ──► cache.put_or_existing(key) ─► OperationSucceeded
//!   │       └─ Err ──► publish AttemptFailed
//!   │                  ├─ not retryable       ─► NonRetryableFailure, return Err
//!   │                  ├─ attempt == max      ─► RetriesExhausted, return Err
//!   │                  └─ otherwise:
//!   │                       ├─ delay = backoff.delay(attempt)
//!   │                       ├─ publish BackoffScheduled{ delay, attempt }
//!   │                       └─ sleep(delay)
//! }
//! ```
//!
//! ## Features
//! | Area               | Description                                                  | Key types / traits                               |
//! |--------------------|--------------------------------------------------------------|--------------------------------------------------|
//! | **Policies**       | Backoff, jitter, retry presets and error classification.     | [`BackoffPolicy`], [`RetryPolicy`], [`is_retryable`] |
//! | **Idempotency**    | Deterministic keys and a time-bounded result cache.          | [`IdempotencyKey`], [`IdempotencyCache`]         |
//! | **Rate limiting**  | Fixed-window admission per caller.                           | [`Admission`], [`RateLimiter`]                   |
//! | **Orchestration**  | Retries, batches and the pipeline boundary.                  | [`Pipeline`], [`RetryOrchestrator`], [`BatchCoordinator`] |
//! | **Submissions**    | Payload model and persistence/validation contracts.          | [`Submission`], [`RecordStore`], [`Validate`]    |
//! | **Subscriber API** | Hook into pipeline events (logging, metrics, auditing).      | [`Subscribe`], [`Event`]                         |
//! | **Errors**         | Typed per-attempt and surfaced errors.                       | [`OperationError`], [`PipelineError`]            |
//! | **Configuration**  | Centralized settings with JSON and environment loading.      | [`PipelineConfig`]                               |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] forwarding events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use submitvisor::{IdempotencyKey, OperationError, Pipeline, PipelineConfig, RetryPolicy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = PipelineConfig::default();
//!     cfg.retry.backoff.base = Duration::from_millis(10);
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn submitvisor::Subscribe>> = vec![Arc::new(submitvisor::LogWriter)];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn submitvisor::Subscribe>> = Vec::new();
//!
//!     let pipeline = Pipeline::<u64>::builder(cfg).with_subscribers(subs).build();
//!
//!     let key = IdempotencyKey::derive("invoice", "alice", "id=42");
//!     let mut calls = 0;
//!     let done = pipeline
//!         .execute(
//!             |_token| {
//!                 calls += 1;
//!                 let n = calls;
//!                 async move {
//!                     if n == 1 {
//!                         Err(OperationError::status(503, "service unavailable"))
//!                     } else {
//!                         Ok(42)
//!                     }
//!                 }
//!             },
//!             &RetryPolicy::default(),
//!             Some(&key),
//!         )
//!         .await?;
//!     assert_eq!(done.value, 42);
//!     assert_eq!(done.attempts, 2);
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod idempotency;
mod limiter;
mod policies;
mod submission;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    BatchConfig, BatchCoordinator, BatchItem, BatchItemResult, BatchReport, BatchStatus,
    Completion, CompletionSource, ConfigError, ENV_PREFIX, Keyed, Pipeline, PipelineBuilder,
    PipelineConfig, RetryOrchestrator,
};
pub use error::{ErrorCategory, OperationError, PipelineError};
pub use events::{Bus, Event, EventKind};
pub use idempotency::{IdempotencyCache, IdempotencyEntry, IdempotencyKey, NaturalKey};
pub use limiter::{Admission, RateDecision, RateLimitConfig, RateLimitWindow, RateLimiter};
pub use policies::{
    BackoffPolicy, DEFAULT_RETRYABLE_CODES, DEFAULT_SPREAD, JitterPolicy, RetryPolicy,
    RetryableCodes, TRANSIENT_PHRASES, is_retryable,
};
pub use submission::{
    ANSWERS_FIELD, AcceptAll, Answer, Record, RecordId, RecordStore, Submission,
    SubmissionReceipt, SubmissionWriter, Validate,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the built-in `tracing` subscriber.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
