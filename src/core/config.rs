//! # Pipeline configuration.
//!
//! Provides [`PipelineConfig`], the centralized settings for a [`Pipeline`](crate::Pipeline).
//!
//! Config can be produced three ways:
//! 1. **In code**: `PipelineConfig::default()` and field overrides
//! 2. **From JSON**: [`PipelineConfig::from_json`] (flat, millisecond-based keys)
//! 3. **From the environment**: [`PipelineConfig::from_env`] (`SUBMITVISOR_*` variables)
//!
//! ## Sentinel values
//! - `sweep_interval = 0s` → no background sweeper (see [`PipelineConfig::sweep_interval_opt`])
//! - `bus_capacity = 0` → clamped to `1`
//! - `retry.attempt_timeout = Some(0s)` → no timeout
//! - `batch.max_concurrency = 0` → chunks of one
//!
//! ## Wire form
//! ```json
//! {
//!   "max_attempts": 5,
//!   "base_delay_ms": 250,
//!   "max_delay_ms": 10000,
//!   "jitter_ratio": 0.25,
//!   "retryable_codes": [429, 503],
//!   "rate_limit": 30,
//!   "rate_window_ms": 60000,
//!   "natural_key": { "mode": "client_id_or_content", "ignore": ["submitted_at"] }
//! }
//! ```
//! Every key is optional; missing keys keep their defaults.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::{
    core::batch::BatchConfig,
    idempotency::NaturalKey,
    limiter::RateLimitConfig,
    policies::{BackoffPolicy, JitterPolicy, RetryPolicy, RetryableCodes},
};

/// Prefix of environment variables read by [`PipelineConfig::from_env`].
pub const ENV_PREFIX: &str = "SUBMITVISOR_";

/// Errors produced while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable had a value that does not parse.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },

    /// The JSON document could not be decoded.
    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for one pipeline instance.
///
/// ## Field semantics
/// - `retry`: default policy for single submissions
/// - `batch`: bounds, chunking and per-item policy for batches
/// - `rate_limit`: per-caller admission window
/// - `idempotency_ttl`: how long a completed result is replayed
/// - `sweep_interval`: period of the background sweep (`0s` = disabled)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `natural_key`: how submissions map to business-level keys
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "PipelineSettings")]
pub struct PipelineConfig {
    /// Retry policy for single submissions.
    pub retry: RetryPolicy,
    /// Batch processing settings.
    pub batch: BatchConfig,
    /// Per-caller rate limit.
    pub rate_limit: RateLimitConfig,
    /// Lifetime of idempotency cache entries.
    pub idempotency_ttl: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Capacity of the event bus.
    pub bus_capacity: usize,
    /// Natural-key selection for submissions.
    pub natural_key: NaturalKey,
}

impl PipelineConfig {
    /// Returns the sweep interval as an `Option`.
    #[inline]
    pub fn sweep_interval_opt(&self) -> Option<Duration> {
        if self.sweep_interval.is_zero() {
            None
        } else {
            Some(self.sweep_interval)
        }
    }

    /// Returns the bus capacity, clamped to at least `1`.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Decodes the flat JSON form.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(doc)?)
    }

    /// Overlays `SUBMITVISOR_*` environment variables on the defaults.
    ///
    /// Recognized variables (suffixes after the prefix): `MAX_ATTEMPTS`, `BASE_DELAY_MS`,
    /// `MAX_DELAY_MS`, `MULTIPLIER`, `JITTER_RATIO`, `ATTEMPT_TIMEOUT_MS`,
    /// `BATCH_MAX_ITEMS`, `BATCH_MAX_CONCURRENCY`, `BATCH_INTER_CHUNK_DELAY_MS`,
    /// `RATE_LIMIT`, `RATE_WINDOW_MS`, `IDEMPOTENCY_TTL_MS`, `SWEEP_INTERVAL_MS`,
    /// `BUS_CAPACITY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut s = PipelineSettings::default();
        let get = |suffix: &str| {
            let var = format!("{ENV_PREFIX}{suffix}");
            lookup(&var).map(|value| (var, value))
        };

        if let Some(v) = get("MAX_ATTEMPTS") {
            s.max_attempts = parse(v)?;
        }
        if let Some(v) = get("BASE_DELAY_MS") {
            s.base_delay_ms = parse(v)?;
        }
        if let Some(v) = get("MAX_DELAY_MS") {
            s.max_delay_ms = parse(v)?;
        }
        if let Some(v) = get("MULTIPLIER") {
            s.multiplier = parse(v)?;
        }
        if let Some(v) = get("JITTER_RATIO") {
            s.jitter_ratio = parse(v)?;
        }
        if let Some(v) = get("ATTEMPT_TIMEOUT_MS") {
            s.attempt_timeout_ms = parse(v)?;
        }
        if let Some(v) = get("BATCH_MAX_ITEMS") {
            s.batch_max_items = parse(v)?;
        }
        if let Some(v) = get("BATCH_MAX_CONCURRENCY") {
            s.batch_max_concurrency = parse(v)?;
        }
        if let Some(v) = get("BATCH_INTER_CHUNK_DELAY_MS") {
            s.batch_inter_chunk_delay_ms = parse(v)?;
        }
        if let Some(v) = get("RATE_LIMIT") {
            s.rate_limit = parse(v)?;
        }
        if let Some(v) = get("RATE_WINDOW_MS") {
            s.rate_window_ms = parse(v)?;
        }
        if let Some(v) = get("IDEMPOTENCY_TTL_MS") {
            s.idempotency_ttl_ms = parse(v)?;
        }
        if let Some(v) = get("SWEEP_INTERVAL_MS") {
            s.sweep_interval_ms = parse(v)?;
        }
        if let Some(v) = get("BUS_CAPACITY") {
            s.bus_capacity = parse(v)?;
        }
        Ok(s.into())
    }
}

impl Default for PipelineConfig {
    /// Returns a configuration with:
    /// - `retry = RetryPolicy::default()` (3 attempts, 1s base, ×2, 30s cap, ±25%)
    /// - `batch = BatchConfig::default()` (100 items, chunks of 5, 500ms pause)
    /// - `rate_limit = RateLimitConfig::default()` (30 per 60s)
    /// - `idempotency_ttl = 24h`
    /// - `sweep_interval = 60s`
    /// - `bus_capacity = 1024`
    /// - `natural_key = NaturalKey::default()`
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch: BatchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            bus_capacity: 1024,
            natural_key: NaturalKey::default(),
        }
    }
}

fn parse<V: std::str::FromStr>((var, value): (String, String)) -> Result<V, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

/// Flat, millisecond-based wire form of [`PipelineConfig`].
#[derive(Debug, Deserialize)]
#[serde(default)]
struct PipelineSettings {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    jitter_ratio: f64,
    retryable_codes: RetryableCodes,
    attempt_timeout_ms: u64,
    batch_max_items: usize,
    batch_max_concurrency: usize,
    batch_inter_chunk_delay_ms: u64,
    rate_limit: u32,
    rate_window_ms: u64,
    idempotency_ttl_ms: u64,
    sweep_interval_ms: u64,
    bus_capacity: usize,
    natural_key: NaturalKey,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let cfg = PipelineConfig::default();
        let backoff = &cfg.retry.backoff;
        Self {
            max_attempts: cfg.retry.max_attempts,
            base_delay_ms: millis(backoff.base),
            max_delay_ms: millis(backoff.max),
            multiplier: backoff.multiplier,
            jitter_ratio: match backoff.jitter {
                JitterPolicy::Spread(ratio) => ratio,
                _ => 0.0,
            },
            retryable_codes: cfg.retry.retryable_codes.clone(),
            attempt_timeout_ms: cfg.retry.attempt_timeout.map_or(0, millis),
            batch_max_items: cfg.batch.max_items,
            batch_max_concurrency: cfg.batch.max_concurrency,
            batch_inter_chunk_delay_ms: millis(cfg.batch.inter_chunk_delay),
            rate_limit: cfg.rate_limit.limit,
            rate_window_ms: millis(cfg.rate_limit.window),
            idempotency_ttl_ms: millis(cfg.idempotency_ttl),
            sweep_interval_ms: millis(cfg.sweep_interval),
            bus_capacity: cfg.bus_capacity,
            natural_key: cfg.natural_key,
        }
    }
}

impl From<PipelineSettings> for PipelineConfig {
    fn from(s: PipelineSettings) -> Self {
        let jitter = if s.jitter_ratio > 0.0 {
            JitterPolicy::Spread(s.jitter_ratio)
        } else {
            JitterPolicy::None
        };
        let retry = RetryPolicy {
            max_attempts: s.max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(s.base_delay_ms),
                max: Duration::from_millis(s.max_delay_ms),
                multiplier: s.multiplier,
                jitter,
            },
            retryable_codes: s.retryable_codes,
            attempt_timeout: (s.attempt_timeout_ms > 0)
                .then(|| Duration::from_millis(s.attempt_timeout_ms)),
        };

        Self {
            batch: BatchConfig {
                max_items: s.batch_max_items,
                max_concurrency: s.batch_max_concurrency,
                inter_chunk_delay: Duration::from_millis(s.batch_inter_chunk_delay_ms),
                retry: retry.clone(),
            },
            retry,
            rate_limit: RateLimitConfig {
                limit: s.rate_limit,
                window: Duration::from_millis(s.rate_window_ms),
            },
            idempotency_ttl: Duration::from_millis(s.idempotency_ttl_ms),
            sweep_interval: Duration::from_millis(s.sweep_interval_ms),
            bus_capacity: s.bus_capacity,
            natural_key: s.natural_key,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
