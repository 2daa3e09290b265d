//! # BatchCoordinator: bounded, isolated processing of a list of items.
//!
//! Splits a batch into chunks of `max_concurrency` items, runs each chunk's items
//! concurrently through the [`RetryOrchestrator`], pauses between chunks, and reports
//! exactly one [`BatchItemResult`] per input item.
//!
//! ## Architecture
//! ```text
//! process_batch(items, factory, config)
//!   ├─► bounds check (1..=max_items)  ── reject → BatchRejected, PipelineError::BatchBounds
//!   ├─► publish BatchStarted
//!   └─► for chunk in items.chunks(max_concurrency):
//!         ├─► sleep(inter_chunk_delay)         (not before the first chunk)
//!         ├─► publish ChunkStarted
//!         ├─► join_all(execute(factory(item), key(item)) for item in chunk)
//!         │     └─► each settles independently → ItemSettled
//!         └─► results.extend(settled)          (input order preserved)
//!   └─► publish BatchFinished → BatchReport
//! ```
//!
//! ## Rules
//! - A failing item never cancels or fails its siblings.
//! - Items of a chunk interleave cooperatively on the calling task (no spawning).
//! - `len(report.results) == len(items)` and `results[i].index == i`.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::orchestrator::{Completion, RetryOrchestrator},
    error::{OperationError, PipelineError},
    events::{Bus, Event, EventKind},
    idempotency::IdempotencyKey,
    policies::RetryPolicy,
};

/// An item that can take part in a batch.
pub trait BatchItem {
    /// Client-supplied identifier echoed back in the item's result.
    fn client_id(&self) -> Option<&str> {
        None
    }

    /// Idempotency key the item's operation runs under.
    fn idempotency_key(&self) -> Option<IdempotencyKey>;
}

/// Wraps an arbitrary payload with its key and client id.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyed<I> {
    /// The payload.
    pub item: I,
    /// Key the item runs under.
    pub key: Option<IdempotencyKey>,
    /// Client-supplied identifier.
    pub client_id: Option<String>,
}

impl<I> Keyed<I> {
    /// Wraps `item` under `key`.
    pub fn new(item: I, key: impl Into<IdempotencyKey>) -> Self {
        Self {
            item,
            key: Some(key.into()),
            client_id: None,
        }
    }

    /// Wraps `item` without an idempotency key.
    pub fn unkeyed(item: I) -> Self {
        Self {
            item,
            key: None,
            client_id: None,
        }
    }

    /// Sets the client id.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }
}

impl<I> BatchItem for Keyed<I> {
    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.key.clone()
    }
}

/// Batch processing configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    /// Largest accepted batch.
    pub max_items: usize,
    /// Items run concurrently per chunk (`0` is treated as `1`).
    pub max_concurrency: usize,
    /// Pause between consecutive chunks.
    pub inter_chunk_delay: Duration,
    /// Retry policy applied to every item.
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    /// `100` items max, chunks of `5`, `500ms` between chunks, default retry policy.
    fn default() -> Self {
        Self {
            max_items: 100,
            max_concurrency: 5,
            inter_chunk_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

impl BatchConfig {
    /// Effective chunk size.
    #[inline]
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// Sets the chunk size.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Sets the pause between chunks.
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Sets the per-item retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcome of one batch item.
#[derive(Clone, Debug)]
pub struct BatchItemResult<T> {
    /// Position of the item in the input.
    pub index: usize,
    /// Client-supplied identifier of the item.
    pub client_id: Option<String>,
    /// Idempotency key the item ran under.
    pub key: Option<IdempotencyKey>,
    /// Whether the item succeeded.
    pub success: bool,
    /// Result on success.
    pub value: Option<T>,
    /// Error on failure.
    pub error: Option<PipelineError>,
    /// Stable label of the failure's cause.
    pub error_code: Option<&'static str>,
    /// Attempts performed for this item.
    pub attempts: u32,
    /// True if the value was served from the idempotency cache.
    pub replayed: bool,
}

/// Aggregate classification of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every item succeeded.
    TotalSuccess,
    /// Some items succeeded, some failed.
    PartialSuccess,
    /// Every item failed.
    TotalFailure,
}

/// Result of [`BatchCoordinator::process_batch`].
#[derive(Clone, Debug)]
pub struct BatchReport<T> {
    /// Number of items processed.
    pub total: usize,
    /// Items that succeeded.
    pub succeeded: usize,
    /// Items that failed.
    pub failed: usize,
    /// One result per input item, in input order.
    pub results: Vec<BatchItemResult<T>>,
    /// Wall time of the whole batch.
    pub elapsed: Duration,
}

impl<T> BatchReport<T> {
    /// Aggregate status.
    pub fn status(&self) -> BatchStatus {
        match (self.succeeded, self.failed) {
            (_, 0) => BatchStatus::TotalSuccess,
            (0, _) => BatchStatus::TotalFailure,
            _ => BatchStatus::PartialSuccess,
        }
    }

    /// Keys of failed items, for client-side retry.
    pub fn failed_keys(&self) -> Vec<IdempotencyKey> {
        self.failures().filter_map(|r| r.key.clone()).collect()
    }

    /// Client ids of failed items.
    pub fn failed_client_ids(&self) -> Vec<&str> {
        self.failures().filter_map(|r| r.client_id.as_deref()).collect()
    }

    /// Iterator over failed item results.
    pub fn failures(&self) -> impl Iterator<Item = &BatchItemResult<T>> {
        self.results.iter().filter(|r| !r.success)
    }

    fn summary(&self) -> String {
        format!(
            "total={} succeeded={} failed={}",
            self.total, self.succeeded, self.failed
        )
    }
}

/// Runs batches of items through a shared [`RetryOrchestrator`].
pub struct BatchCoordinator<T> {
    orchestrator: RetryOrchestrator<T>,
    bus: Bus,
}

impl<T> Clone for BatchCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<T: Clone> BatchCoordinator<T> {
    /// Creates a coordinator over `orchestrator`.
    pub fn new(orchestrator: RetryOrchestrator<T>, bus: Bus) -> Self {
        Self { orchestrator, bus }
    }

    /// Processes `items`, building each item's operation with `factory`.
    ///
    /// `factory(item)` returns the per-attempt operation for that item; it is called
    /// once per item, and the returned closure once per attempt.
    ///
    /// # Errors
    /// [`PipelineError::BatchBounds`] if `items` is empty or longer than
    /// `config.max_items`; no item is invoked in that case. Item failures are
    /// reported in [`BatchReport::results`], never as an `Err`.
    pub async fn process_batch<'a, I, Fac, F, Fut>(
        &self,
        items: &'a [I],
        factory: Fac,
        config: &BatchConfig,
    ) -> Result<BatchReport<T>, PipelineError>
    where
        I: BatchItem,
        Fac: Fn(&'a I) -> F,
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let len = items.len();
        if len == 0 || len > config.max_items {
            let err = PipelineError::BatchBounds {
                len,
                max: config.max_items,
            };
            self.bus.publish(
                Event::new(EventKind::BatchRejected)
                    .with_count(len)
                    .with_reason(err.as_message()),
            );
            return Err(err);
        }

        let started = Instant::now();
        self.bus
            .publish(Event::new(EventKind::BatchStarted).with_count(len));

        let size = config.concurrency();
        let mut results = Vec::with_capacity(len);

        for (chunk_no, chunk) in items.chunks(size).enumerate() {
            if chunk_no > 0 && !config.inter_chunk_delay.is_zero() {
                time::sleep(config.inter_chunk_delay).await;
            }
            self.bus.publish(
                Event::new(EventKind::ChunkStarted)
                    .with_index(chunk_no)
                    .with_count(chunk.len()),
            );

            let base = chunk_no * size;
            let factory = &factory;
            let runs = chunk.iter().enumerate().map(|(offset, item)| async move {
                let key = item.idempotency_key();
                let outcome = self
                    .orchestrator
                    .execute(factory(item), &config.retry, key.as_ref())
                    .await;
                self.settle(base + offset, item.client_id(), key, outcome)
            });
            results.extend(join_all(runs).await);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let report = BatchReport {
            total: len,
            succeeded,
            failed: len - succeeded,
            results,
            elapsed: started.elapsed(),
        };
        self.bus.publish(
            Event::new(EventKind::BatchFinished)
                .with_count(report.succeeded)
                .with_reason(report.summary()),
        );
        Ok(report)
    }

    fn settle(
        &self,
        index: usize,
        client_id: Option<&str>,
        key: Option<IdempotencyKey>,
        outcome: Result<Completion<T>, PipelineError>,
    ) -> BatchItemResult<T> {
        let client_id = client_id.map(str::to_owned);
        let result = match outcome {
            Ok(done) => BatchItemResult {
                index,
                client_id,
                key,
                success: true,
                attempts: done.attempts,
                replayed: done.is_replay(),
                value: Some(done.value),
                error: None,
                error_code: None,
            },
            Err(err) => BatchItemResult {
                index,
                client_id,
                key,
                success: false,
                value: None,
                attempts: err.attempts(),
                replayed: false,
                error_code: Some(err.cause().map_or(err.as_label(), OperationError::as_label)),
                error: Some(err),
            },
        };

        let mut ev = Event::new(EventKind::ItemSettled)
            .with_index(index)
            .with_key_opt(result.key.as_ref().map(IdempotencyKey::as_str))
            .with_attempt(result.attempts);
        if let Some(err) = &result.error {
            ev = ev.with_reason(err.to_string());
        }
        self.bus.publish(ev);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::IdempotencyCache;
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> BatchCoordinator<usize> {
        let bus = Bus::new(1024);
        let cache = Arc::new(IdempotencyCache::new(Duration::from_secs(60)));
        BatchCoordinator::new(
            RetryOrchestrator::new(cache, bus.clone(), Duration::from_secs(60)),
            bus,
        )
    }

    fn config() -> BatchConfig {
        BatchConfig::default().with_retry(RetryPolicy::default().with_backoff(BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(10),
            multiplier: 1.0,
            jitter: JitterPolicy::None,
        }))
    }

    fn items(n: usize) -> Vec<Keyed<usize>> {
        (0..n)
            .map(|i| Keyed::new(i, format!("item-{i}")).with_client_id(format!("c{i}")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_oversized_batches_are_rejected() {
        let coord = coordinator();
        let invoked = AtomicUsize::new(0);
        let factory = |item: &Keyed<usize>| {
            let invoked = &invoked;
            let v = item.item;
            move |_: CancellationToken| {
                invoked.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, OperationError>(v) }
            }
        };

        let empty: Vec<Keyed<usize>> = Vec::new();
        let err = coord
            .process_batch(&empty, factory, &config())
            .await
            .expect_err("empty");
        assert!(matches!(err, PipelineError::BatchBounds { len: 0, max: 100 }));

        let big = items(101);
        let err = coord
            .process_batch(&big, factory, &config())
            .await
            .expect_err("oversized");
        assert!(matches!(err, PipelineError::BatchBounds { len: 101, .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_item_does_not_affect_siblings() {
        let coord = coordinator();
        let batch = items(7);

        let report = coord
            .process_batch(
                &batch,
                |item: &Keyed<usize>| {
                    let v = item.item;
                    move |_: CancellationToken| async move {
                        if v == 3 {
                            Err(OperationError::network("socket closed"))
                        } else {
                            Ok(v * 10)
                        }
                    }
                },
                &config(),
            )
            .await
            .expect("processed");

        assert_eq!(report.results.len(), 7);
        assert_eq!(report.succeeded, 6);
        assert_eq!(report.failed, 1);
        assert_eq!(report.status(), BatchStatus::PartialSuccess);
        for (i, r) in report.results.iter().enumerate() {
            assert_eq!(r.index, i);
        }
        let failed = &report.results[3];
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.error_code, Some("operation_network"));
        assert_eq!(report.failed_keys(), vec![IdempotencyKey::new("item-3")]);
        assert_eq!(report.failed_client_ids(), vec!["c3"]);
        assert_eq!(report.results[4].value, Some(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_pause_between_but_not_after() {
        let coord = coordinator();
        let batch = items(11);

        let report = coord
            .process_batch(
                &batch,
                |item: &Keyed<usize>| {
                    let v = item.item;
                    move |_: CancellationToken| async move { Ok::<_, OperationError>(v) }
                },
                &config().with_max_concurrency(5),
            )
            .await
            .expect("processed");

        // three chunks, two pauses
        assert_eq!(report.elapsed, Duration::from_millis(1000));
        assert_eq!(report.status(), BatchStatus::TotalSuccess);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_items_run_concurrently() {
        let coord = coordinator();
        let batch = items(4);

        let report = coord
            .process_batch(
                &batch,
                |_: &Keyed<usize>| {
                    |_: CancellationToken| async {
                        time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, OperationError>(1)
                    }
                },
                &config().with_max_concurrency(0).with_inter_chunk_delay(Duration::ZERO),
            )
            .await
            .expect("processed");
        assert_eq!(report.elapsed, Duration::from_millis(400));

        let report = coord
            .process_batch(
                &batch,
                |_: &Keyed<usize>| {
                    |_: CancellationToken| async {
                        time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, OperationError>(1)
                    }
                },
                &config().with_max_concurrency(4),
            )
            .await
            .expect("processed");
        // all four keys were cached by the first run
        assert_eq!(report.elapsed, Duration::ZERO);
        assert!(report.results.iter().all(|r| r.replayed && r.attempts == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failing_is_total_failure() {
        let coord = coordinator();
        let batch = items(2);

        let report = coord
            .process_batch(
                &batch,
                |_: &Keyed<usize>| {
                    |_: CancellationToken| async {
                        Err::<usize, _>(OperationError::validation("bad"))
                    }
                },
                &config(),
            )
            .await
            .expect("processed");

        assert_eq!(report.status(), BatchStatus::TotalFailure);
        assert!(report.results.iter().all(|r| r.attempts == 1));
    }
}
