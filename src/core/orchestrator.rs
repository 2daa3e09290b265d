//! # RetryOrchestrator: drives one logical operation to a final outcome.
//!
//! Runs a caller-supplied operation with retries, backoff, error classification and
//! idempotent replay.
//!
//! ## Event flow
//! ```text
//! key known and cached ─────────────────────────────► IdempotentReplay (no invocation)
//!
//! AttemptStarting → [operation] → OperationSucceeded         (stored, first writer)
//!                               → IdempotentDiscarded        (another writer won)
//!                               → AttemptFailed → NonRetryableFailure
//!                                               → RetriesExhausted
//!                                               → BackoffScheduled → [sleep] → next attempt
//! ```
//!
//! ## Architecture
//! ```text
//! execute(operation, policy, key)
//!
//! for attempt in 1..=max_attempts {
//!   ├─► cache.get(key)      hit → Completion { source: Replayed }
//!   ├─► publish AttemptStarting
//!   ├─► run_once()  ─────► operation(token)   (per-attempt timeout)
//!   │     ├─ Ok(v)  → cache.put_or_existing(key, v) → Completion { source: Executed }
//!   │     └─ Err(e) → is_retryable(e)?
//!   │                   ├─ no        → PipelineError::NonRetryable
//!   │                   ├─ last      → PipelineError::ExhaustedRetries
//!   │                   └─ otherwise → BackoffScheduled, sleep(backoff.delay(attempt))
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially** for one call.
//! - The cache is re-checked before every attempt so a concurrent writer that finished
//!   during our backoff short-circuits the remaining attempts.
//! - The backoff sleep is the only suspension point besides the operation itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::runner::run_once,
    error::{OperationError, PipelineError},
    events::{Bus, Event, EventKind},
    idempotency::{IdempotencyCache, IdempotencyKey},
    policies::{RetryPolicy, is_retryable},
};

/// Where a successful result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionSource {
    /// The operation ran and this call produced (or adopted) the result.
    Executed,
    /// The result was served from the idempotency cache without invoking the operation.
    Replayed,
}

/// Successful outcome of [`RetryOrchestrator::execute`].
#[derive(Clone, Debug, PartialEq)]
pub struct Completion<T> {
    /// The operation's result (or the cached result for the same key).
    pub value: T,
    /// Attempts performed by this call (`0` for a replay before any attempt).
    pub attempts: u32,
    /// Wall time spent in this call.
    pub elapsed: Duration,
    /// Whether the value was produced here or replayed from the cache.
    pub source: CompletionSource,
}

impl<T> Completion<T> {
    /// True if the value came from the idempotency cache.
    #[inline]
    pub fn is_replay(&self) -> bool {
        self.source == CompletionSource::Replayed
    }

    /// Consumes the completion and returns the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Drives operations through retries against a shared idempotency cache.
///
/// Cheap to clone: the cache and the bus are shared handles.
pub struct RetryOrchestrator<T> {
    cache: Arc<IdempotencyCache<T>>,
    bus: Bus,
    ttl: Duration,
}

impl<T> Clone for RetryOrchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            bus: self.bus.clone(),
            ttl: self.ttl,
        }
    }
}

impl<T: Clone> RetryOrchestrator<T> {
    /// Creates an orchestrator storing results for `ttl`.
    pub fn new(cache: Arc<IdempotencyCache<T>>, bus: Bus, ttl: Duration) -> Self {
        Self { cache, bus, ttl }
    }

    /// Shared idempotency cache.
    pub fn cache(&self) -> &Arc<IdempotencyCache<T>> {
        &self.cache
    }

    /// Runs `operation` until it succeeds, fails non-retryably, or exhausts `policy`.
    ///
    /// `operation` is invoked once per attempt with a fresh [`CancellationToken`], which
    /// is cancelled if the attempt exceeds `policy.attempt_timeout`.
    ///
    /// With `key`, a live cached result is returned without invoking `operation`, and a
    /// successful result is stored first-writer-wins: if another writer stored a result
    /// first, that result is returned instead of ours.
    ///
    /// # Errors
    /// - [`PipelineError::NonRetryable`] on the first non-retryable failure.
    /// - [`PipelineError::ExhaustedRetries`] when the last allowed attempt fails.
    pub async fn execute<F, Fut>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
        key: Option<&IdempotencyKey>,
    ) -> Result<Completion<T>, PipelineError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let started = Instant::now();
        let limit = policy.attempts_limit();
        let key_str = key.map(IdempotencyKey::as_str);
        let mut attempt: u32 = 0;

        loop {
            if let Some(hit) = key.and_then(|k| self.cache.get(k)) {
                self.bus.publish(
                    Event::new(EventKind::IdempotentReplay)
                        .with_key_opt(key_str)
                        .with_attempt(attempt),
                );
                return Ok(Completion {
                    value: hit.result,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    source: CompletionSource::Replayed,
                });
            }

            attempt += 1;
            self.bus.publish(
                Event::new(EventKind::AttemptStarting)
                    .with_key_opt(key_str)
                    .with_attempt(attempt),
            );

            let err = match run_once(
                &mut operation,
                policy.timeout(),
                attempt,
                key_str,
                &self.bus,
            )
            .await
            {
                Ok(value) => return Ok(self.settle(value, key, attempt, started)),
                Err(e) => e,
            };

            if !is_retryable(&err, &policy.retryable_codes) {
                self.bus.publish(
                    Event::new(EventKind::NonRetryableFailure)
                        .with_key_opt(key_str)
                        .with_attempt(attempt)
                        .with_reason(err.as_label()),
                );
                return Err(PipelineError::NonRetryable {
                    cause: err,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                });
            }
            if attempt >= limit {
                self.bus.publish(
                    Event::new(EventKind::RetriesExhausted)
                        .with_key_opt(key_str)
                        .with_attempt(attempt)
                        .with_reason(err.to_string()),
                );
                return Err(PipelineError::ExhaustedRetries {
                    cause: err,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                });
            }

            let delay = policy.backoff.delay(attempt);
            self.bus.publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_key_opt(key_str)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(err.as_label()),
            );
            time::sleep(delay).await;
        }
    }

    /// Records a successful value, adopting an earlier writer's result if one exists.
    fn settle(
        &self,
        value: T,
        key: Option<&IdempotencyKey>,
        attempt: u32,
        started: Instant,
    ) -> Completion<T> {
        let key_str = key.map(IdempotencyKey::as_str);
        let value = match key {
            Some(k) => match self.cache.put_or_existing(k.clone(), value.clone(), self.ttl) {
                None => value,
                Some(existing) => {
                    self.bus.publish(
                        Event::new(EventKind::IdempotentDiscarded)
                            .with_key(k.as_str())
                            .with_attempt(attempt),
                    );
                    existing
                }
            },
            None => value,
        };

        self.bus.publish(
            Event::new(EventKind::OperationSucceeded)
                .with_key_opt(key_str)
                .with_attempt(attempt),
        );
        Completion {
            value,
            attempts: attempt,
            elapsed: started.elapsed(),
            source: CompletionSource::Executed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn orchestrator() -> RetryOrchestrator<u32> {
        RetryOrchestrator::new(
            Arc::new(IdempotencyCache::new(Duration::from_secs(60))),
            Bus::new(256),
            Duration::from_secs(60),
        )
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_backoff(BackoffPolicy {
                base: Duration::from_millis(10),
                max: Duration::from_millis(100),
                multiplier: 2.0,
                jitter: JitterPolicy::None,
            })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        let done = orch
            .execute(
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(OperationError::status(503, "unavailable"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                &fast_policy(3),
                None,
            )
            .await
            .expect("third attempt succeeds");

        assert_eq!(done.value, 3);
        assert_eq!(done.attempts, 3);
        assert_eq!(done.source, CompletionSource::Executed);
        assert_eq!(done.elapsed, Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_after_one_attempt() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        let err = orch
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, _>(OperationError::validation("title missing")) }
                },
                &fast_policy(5),
                None,
            )
            .await
            .expect_err("validation is final");

        assert!(matches!(err, PipelineError::NonRetryable { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        let err = orch
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, _>(OperationError::network("connection reset")) }
                },
                &fast_policy(4),
                None,
            )
            .await
            .expect_err("always failing");

        assert_eq!(err.as_label(), "pipeline_exhausted_retries");
        assert_eq!(err.attempts(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_runs_once() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);

        let err = orch
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, _>(OperationError::network("down")) }
                },
                &fast_policy(0),
                None,
            )
            .await
            .expect_err("single failing attempt");

        assert_eq!(err.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_key_replays_without_invoking() {
        let orch = orchestrator();
        let key = IdempotencyKey::new("form:alice:id=1");
        let calls = AtomicU32::new(0);
        let op = |_: CancellationToken| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, OperationError>(n * 100) }
        };

        let first = orch
            .execute(op, &fast_policy(3), Some(&key))
            .await
            .expect("first");
        let second = orch
            .execute(
                |_| async { Ok::<_, OperationError>(999) },
                &fast_policy(3),
                Some(&key),
            )
            .await
            .expect("replay");

        assert_eq!(first.value, 100);
        assert_eq!(second.value, 100);
        assert_eq!(second.attempts, 0);
        assert!(second.is_replay());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_losing_writer_adopts_existing_result() {
        let orch = orchestrator();
        let key = IdempotencyKey::new("k");
        let cache = Arc::clone(orch.cache());

        let done = orch
            .execute(
                |_| {
                    let cache = Arc::clone(&cache);
                    async move {
                        // Another writer completes while this attempt is in flight.
                        cache.put_default(IdempotencyKey::new("k"), 7);
                        Ok::<_, OperationError>(8)
                    }
                },
                &fast_policy(1),
                Some(&key),
            )
            .await
            .expect("success");

        assert_eq!(done.value, 7);
        assert_eq!(done.source, CompletionSource::Executed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let orch = orchestrator();
        let calls = AtomicU32::new(0);
        let policy = fast_policy(2).with_attempt_timeout(Some(Duration::from_millis(50)));

        let done = orch
            .execute(
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n == 1 {
                            time::sleep(Duration::from_secs(5)).await;
                        }
                        Ok::<_, OperationError>(n)
                    }
                },
                &policy,
                None,
            )
            .await
            .expect("second attempt in time");

        assert_eq!(done.attempts, 2);
        assert_eq!(done.elapsed, Duration::from_millis(60));
    }
}
