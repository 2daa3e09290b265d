use std::sync::Arc;

use crate::{
    core::{config::PipelineConfig, pipeline::Pipeline},
    events::Bus,
    idempotency::IdempotencyCache,
    limiter::{Admission, RateLimiter},
    submission::{AcceptAll, Validate},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Pipeline`] with optional collaborators.
///
/// Anything not supplied is created from the [`PipelineConfig`]:
/// a [`RateLimiter`] over `rate_limit`, an empty [`IdempotencyCache`] with
/// `idempotency_ttl`, and the [`AcceptAll`] validator.
pub struct PipelineBuilder<T> {
    cfg: PipelineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    admission: Option<Arc<dyn Admission>>,
    cache: Option<Arc<IdempotencyCache<T>>>,
    validator: Option<Arc<dyn Validate>>,
}

impl<T: Clone + Send + Sync + 'static> PipelineBuilder<T> {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            admission: None,
            cache: None,
            validator: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive pipeline events (attempts, failures, batch progress)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default fixed-window limiter.
    pub fn with_admission(mut self, admission: Arc<dyn Admission>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Shares an existing idempotency cache (e.g. between pipelines of one process).
    pub fn with_cache(mut self, cache: Arc<IdempotencyCache<T>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the request validator used by `submit` and `submit_batch`.
    pub fn with_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Builds the pipeline and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime: spawns the subscriber workers,
    /// the event listener and (if `sweep_interval > 0`) the sweeper.
    pub fn build(self) -> Pipeline<T> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(IdempotencyCache::new(self.cfg.idempotency_ttl)));
        let admission = self
            .admission
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.cfg.rate_limit)));
        let validator = self.validator.unwrap_or_else(|| Arc::new(AcceptAll));

        let mut pipeline = Pipeline::new_internal(self.cfg, bus, subs, cache, admission, validator);
        pipeline.start_sweeper();
        pipeline
    }
}
