//! # Pipeline events emitted by the orchestrator, batch coordinator and sweeper.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Attempt events**: one operation attempt (starting, failed, timeout, backoff)
//! - **Outcome events**: final result of one logical operation
//! - **Admission/batch events**: rate limiting, batch progress, compensation
//! - **Housekeeping events**: sweeps and subscriber health
//!
//! The [`Event`] struct carries metadata such as timestamps, idempotency key,
//! caller, attempt number, and backoff delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use submitvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::AttemptFailed)
//!     .with_key("survey:alice:42")
//!     .with_reason("status 503: down")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(200));
//!
//! assert_eq!(ev.kind, EventKind::AttemptFailed);
//! assert_eq!(ev.key.as_deref(), Some("survey:alice:42"));
//! assert_eq!(ev.delay_ms, Some(200));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `caller`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `caller`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Attempt events ===
    /// An operation attempt is starting.
    ///
    /// Sets:
    /// - `key`: idempotency key (if any)
    /// - `attempt`: attempt number (1-based)
    AttemptStarting,

    /// An attempt failed.
    ///
    /// Sets:
    /// - `key`, `attempt`
    /// - `reason`: failure message
    AttemptFailed,

    /// An attempt exceeded its configured timeout (always followed by `AttemptFailed`).
    ///
    /// Sets:
    /// - `key`, `attempt`
    /// - `timeout_ms`: configured attempt timeout (ms)
    TimeoutHit,

    /// Next attempt scheduled after a retryable failure.
    ///
    /// Sets:
    /// - `key`
    /// - `attempt`: failed attempt number
    /// - `delay_ms`: delay before the next attempt (ms)
    /// - `reason`: last failure message
    BackoffScheduled,

    // === Outcome events ===
    /// The operation succeeded.
    ///
    /// Sets:
    /// - `key`, `attempt` (the successful attempt)
    OperationSucceeded,

    /// A cached result was returned without invoking the operation.
    ///
    /// Sets:
    /// - `key`
    IdempotentReplay,

    /// The operation succeeded but another completion for the same key was cached first.
    ///
    /// Sets:
    /// - `key`, `attempt`
    IdempotentDiscarded,

    /// Every allowed attempt failed with a retryable error.
    ///
    /// Sets:
    /// - `key`, `attempt` (attempts performed), `reason`
    RetriesExhausted,

    /// The operation failed with a non-retryable error.
    ///
    /// Sets:
    /// - `key`, `attempt`, `reason`
    NonRetryableFailure,

    // === Admission / batch events ===
    /// A caller was denied by the rate limiter.
    ///
    /// Sets:
    /// - `caller`
    /// - `delay_ms`: time until the caller's window resets
    RateLimited,

    /// A batch was accepted.
    ///
    /// Sets:
    /// - `count`: number of items
    BatchStarted,

    /// A batch was rejected before processing (empty or oversized).
    ///
    /// Sets:
    /// - `count`: number of items, `reason`
    BatchRejected,

    /// A chunk of a batch is starting.
    ///
    /// Sets:
    /// - `index`: chunk index (0-based)
    /// - `count`: items in the chunk
    ChunkStarted,

    /// One batch item settled (success or failure).
    ///
    /// Sets:
    /// - `index`: item position, `key`, `attempt`
    /// - `reason`: error message on failure
    ItemSettled,

    /// A batch finished.
    ///
    /// Sets:
    /// - `count`: successful items
    /// - `reason`: summary (`total=.. succeeded=.. failed=..`)
    BatchFinished,

    /// A best-effort compensation step failed; the partial record may remain.
    ///
    /// Sets:
    /// - `key`, `reason`
    CompensationFailed,

    // === Housekeeping ===
    /// Periodic sweep removed expired state.
    ///
    /// Sets:
    /// - `count`: entries removed (cache + limiter)
    SweepCompleted,
}

/// Pipeline event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Idempotency key of the operation, if applicable.
    pub key: Option<Arc<str>>,
    /// Caller key (rate limiting) or subscriber name.
    pub caller: Option<Arc<str>>,
    /// Human-readable reason (errors, summaries, overflow details).
    pub reason: Option<Arc<str>>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// Attempt timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Delay in milliseconds (backoff or rate-limit reset).
    pub delay_ms: Option<u32>,
    /// Position of a batch item or chunk.
    pub index: Option<usize>,
    /// Generic counter (batch size, successes, swept entries).
    pub count: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            key: None,
            caller: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
            index: None,
            count: None,
        }
    }

    /// Attaches an idempotency key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches an idempotency key if present.
    #[inline]
    pub fn with_key_opt(mut self, key: Option<&str>) -> Self {
        self.key = key.map(Arc::from);
        self
    }

    /// Attaches a caller key.
    #[inline]
    pub fn with_caller(mut self, caller: impl Into<Arc<str>>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches an item/chunk position.
    #[inline]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches a counter.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_caller(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_caller(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
