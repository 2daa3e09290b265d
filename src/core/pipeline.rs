//! # Pipeline: the boundary that owns shared state.
//!
//! [`Pipeline`] wires the rate limiter, the idempotency cache, the retry orchestrator
//! and the batch coordinator together, and runs two background tasks:
//! - the **event listener** forwarding bus events to the [`SubscriberSet`];
//! - the **sweeper** removing expired cache entries and rate-limit windows.
//!
//! ## Architecture
//! ```text
//! submit(caller, submission, store)
//!   ├─► check_and_consume(caller)   denied → RateLimited event, PipelineError::RateLimited
//!   ├─► submission.idempotency_key(natural_key)
//!   └─► orchestrator.execute(|_| writer.write(submission, key), cfg.retry, key)
//!
//! submit_batch(caller, submissions, store)
//!   ├─► check_and_consume(caller)   (once for the whole batch)
//!   └─► batch.process_batch(keyed submissions, factory, cfg.batch)
//!
//! Background:
//!   Bus ──► listener ──► SubscriberSet::emit ──► subscribers
//!   interval(sweep) ──► cache.sweep() + admission.sweep() ──► SweepCompleted
//! ```
//!
//! ## Rules
//! - The rate limiter is consulted once per inbound request, never per attempt.
//! - Dropping the pipeline stops the background tasks; [`Pipeline::shutdown`] also
//!   drains queued events into the subscribers first.

use std::future::Future;
use std::sync::Arc;

use tokio::{
    select,
    sync::broadcast::error::{RecvError, TryRecvError},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        batch::{BatchConfig, BatchCoordinator, BatchItem, BatchReport, Keyed},
        builder::PipelineBuilder,
        config::PipelineConfig,
        orchestrator::{Completion, RetryOrchestrator},
    },
    error::{OperationError, PipelineError},
    events::{Bus, Event, EventKind},
    idempotency::{IdempotencyCache, IdempotencyKey},
    limiter::{Admission, RateDecision},
    policies::RetryPolicy,
    submission::{RecordStore, Submission, SubmissionReceipt, SubmissionWriter, Validate},
    subscribers::SubscriberSet,
};

/// Resilient, idempotent submission pipeline.
///
/// Build one per process with [`Pipeline::builder`] (or [`Pipeline::new`]) from inside
/// a tokio runtime, and share it by reference or `Arc`.
pub struct Pipeline<T> {
    cfg: PipelineConfig,
    bus: Bus,
    cache: Arc<IdempotencyCache<T>>,
    admission: Arc<dyn Admission>,
    validator: Arc<dyn Validate>,
    orchestrator: RetryOrchestrator<T>,
    batch: BatchCoordinator<T>,
    token: CancellationToken,
    listener: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> Pipeline<T> {
    /// Creates a pipeline with default collaborators and no subscribers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: PipelineConfig) -> Self {
        Self::builder(cfg).build()
    }

    /// Returns a builder for customizing subscribers and shared state.
    pub fn builder(cfg: PipelineConfig) -> PipelineBuilder<T> {
        PipelineBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: PipelineConfig,
        bus: Bus,
        subs: SubscriberSet,
        cache: Arc<IdempotencyCache<T>>,
        admission: Arc<dyn Admission>,
        validator: Arc<dyn Validate>,
    ) -> Self {
        let orchestrator = RetryOrchestrator::new(
            Arc::clone(&cache),
            bus.clone(),
            cfg.idempotency_ttl,
        );
        let batch = BatchCoordinator::new(orchestrator.clone(), bus.clone());
        let token = CancellationToken::new();
        let listener = subscriber_listener(&bus, subs, token.clone());

        Self {
            cfg,
            bus,
            cache,
            admission,
            validator,
            orchestrator,
            batch,
            token,
            listener: Some(listener),
            sweeper: None,
        }
    }

    /// Starts the background sweeper if `sweep_interval` is non-zero.
    ///
    /// Returns `false` if disabled or already running.
    pub fn start_sweeper(&mut self) -> bool {
        let Some(interval) = self.cfg.sweep_interval_opt() else {
            return false;
        };
        if self.sweeper.is_some() {
            return false;
        }

        let cache = Arc::clone(&self.cache);
        let admission = Arc::clone(&self.admission);
        let bus = self.bus.clone();
        let token = self.token.clone();

        self.sweeper = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep() + admission.sweep();
                        bus.publish(Event::new(EventKind::SweepCompleted).with_count(removed));
                    }
                }
            }
        }));
        true
    }

    /// Counts one request for `caller_key` against its rate-limit window.
    ///
    /// Publishes `RateLimited` when the request is denied.
    pub fn check_and_consume(&self, caller_key: &str) -> RateDecision {
        let decision = self.admission.check_and_consume(caller_key);
        if !decision.allowed {
            self.bus.publish(
                Event::new(EventKind::RateLimited)
                    .with_caller(caller_key)
                    .with_delay(decision.retry_after()),
            );
        }
        decision
    }

    /// Runs `operation` with retries and idempotent replay.
    ///
    /// See [`RetryOrchestrator::execute`].
    pub async fn execute<F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy,
        key: Option<&IdempotencyKey>,
    ) -> Result<Completion<T>, PipelineError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.orchestrator.execute(operation, policy, key).await
    }

    /// Processes a batch of items with per-item isolation.
    ///
    /// See [`BatchCoordinator::process_batch`].
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
        self.batch.process_batch(items, factory, config).await
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Event bus (subscribe for raw events).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Shared idempotency cache.
    pub fn cache(&self) -> &Arc<IdempotencyCache<T>> {
        &self.cache
    }

    /// Admission control in use.
    pub fn admission(&self) -> &Arc<dyn Admission> {
        &self.admission
    }

    /// Stops the background tasks, delivering already-published events first.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(h) = self.sweeper.take() {
            let _ = h.await;
        }
        if let Some(h) = self.listener.take() {
            let _ = h.await;
        }
    }

    fn admit(&self, caller_key: &str) -> Result<(), PipelineError> {
        let decision = self.check_and_consume(caller_key);
        if decision.allowed {
            Ok(())
        } else {
            Err(PipelineError::RateLimited {
                caller: caller_key.to_owned(),
                retry_after: decision.retry_after(),
            })
        }
    }
}

impl Pipeline<SubmissionReceipt> {
    /// Submits one record on behalf of `caller_key`.
    ///
    /// # Errors
    /// - [`PipelineError::RateLimited`] if the caller's window is exhausted (nothing runs).
    /// - [`PipelineError::NonRetryable`] on validation or other request defects.
    /// - [`PipelineError::ExhaustedRetries`] if the store keeps failing transiently.
    pub async fn submit(
        &self,
        caller_key: &str,
        submission: &Submission,
        store: Arc<dyn RecordStore>,
    ) -> Result<Completion<SubmissionReceipt>, PipelineError> {
        self.admit(caller_key)?;

        let writer = self.writer(store);
        let key = submission.idempotency_key(&self.cfg.natural_key);
        self.orchestrator
            .execute(
                |_| writer.write(submission, Some(&key)),
                &self.cfg.retry,
                Some(&key),
            )
            .await
    }

    /// Submits a list of records on behalf of `caller_key`.
    ///
    /// The caller is rate-checked once for the whole batch; items are validated and
    /// written independently, each under its own idempotency key.
    ///
    /// # Errors
    /// [`PipelineError::RateLimited`] or [`PipelineError::BatchBounds`]; item failures
    /// are reported inside the [`BatchReport`].
    pub async fn submit_batch(
        &self,
        caller_key: &str,
        submissions: Vec<Submission>,
        store: Arc<dyn RecordStore>,
    ) -> Result<BatchReport<SubmissionReceipt>, PipelineError> {
        self.admit(caller_key)?;

        let writer = self.writer(store);
        let natural_key = &self.cfg.natural_key;
        let items: Vec<Keyed<Submission>> = submissions
            .into_iter()
            .map(|s| {
                let key = s.idempotency_key(natural_key);
                let client_id = s.client_id.clone();
                Keyed {
                    item: s,
                    key: Some(key),
                    client_id,
                }
            })
            .collect();

        let writer = &writer;
        self.batch
            .process_batch(
                &items,
                |item| move |_: CancellationToken| writer.write(&item.item, item.key.as_ref()),
                &self.cfg.batch,
            )
            .await
    }

    fn writer(&self, store: Arc<dyn RecordStore>) -> SubmissionWriter {
        SubmissionWriter::new(store, Arc::clone(&self.validator), self.bus.clone())
    }
}

impl<T> Drop for Pipeline<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns the task forwarding bus events to subscribers until `token` is cancelled.
fn subscriber_listener(bus: &Bus, subs: SubscriberSet, token: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            select! {
                res = rx.recv() => match res {
                    Ok(ev) => subs.emit(&ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => subs.emit(&ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        subs.shutdown().await;
    })
}
