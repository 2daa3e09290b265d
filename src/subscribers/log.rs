//! # Logging subscriber forwarding pipeline events to `tracing`.
//!
//! [`LogWriter`] maps each [`EventKind`] to a `tracing` level with structured fields:
//!
//! ```text
//! DEBUG attempt starting          key=survey:alice:42 attempt=1
//! WARN  attempt failed            key=survey:alice:42 attempt=1 error="status 503: down"
//! DEBUG backoff scheduled         key=survey:alice:42 attempt=1 delay_ms=980
//! WARN  retries exhausted         key=survey:alice:42 attempts=3 error="..."
//! WARN  caller rate limited       caller=10.0.0.7 retry_after_ms=41000
//! INFO  batch finished            succeeded=9 summary="total=10 succeeded=9 failed=1"
//! ERROR compensation failed       key=survey:alice:42 error="..."
//! ```
//!
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see the output.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Structured logging subscriber.
///
/// Enabled via the `logging` feature (on by default).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let key = e.key.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::AttemptStarting => {
                debug!(key, attempt = e.attempt, "attempt starting");
            }
            EventKind::AttemptFailed => {
                warn!(key, attempt = e.attempt, error = reason, "attempt failed");
            }
            EventKind::TimeoutHit => {
                warn!(key, attempt = e.attempt, timeout_ms = e.timeout_ms, "attempt timed out");
            }
            EventKind::BackoffScheduled => {
                debug!(key, attempt = e.attempt, delay_ms = e.delay_ms, "backoff scheduled");
            }
            EventKind::OperationSucceeded => {
                debug!(key, attempt = e.attempt, "operation succeeded");
            }
            EventKind::IdempotentReplay => {
                info!(key, "duplicate operation served from idempotency cache");
            }
            EventKind::IdempotentDiscarded => {
                debug!(key, attempt = e.attempt, "result discarded, key already cached");
            }
            EventKind::RetriesExhausted => {
                warn!(key, attempts = e.attempt, error = reason, "retries exhausted");
            }
            EventKind::NonRetryableFailure => {
                warn!(key, attempts = e.attempt, error = reason, "non-retryable failure");
            }
            EventKind::RateLimited => {
                warn!(
                    caller = e.caller.as_deref(),
                    retry_after_ms = e.delay_ms,
                    "caller rate limited"
                );
            }
            EventKind::BatchStarted => {
                info!(items = e.count, "batch started");
            }
            EventKind::BatchRejected => {
                warn!(items = e.count, reason, "batch rejected");
            }
            EventKind::ChunkStarted => {
                debug!(chunk = e.index, items = e.count, "chunk started");
            }
            EventKind::ItemSettled => {
                if e.reason.is_some() {
                    debug!(index = e.index, key, attempts = e.attempt, error = reason, "item failed");
                } else {
                    debug!(index = e.index, key, attempts = e.attempt, "item succeeded");
                }
            }
            EventKind::BatchFinished => {
                info!(succeeded = e.count, summary = reason, "batch finished");
            }
            EventKind::CompensationFailed => {
                error!(key, error = reason, "compensation failed, partial record may remain");
            }
            EventKind::SweepCompleted => {
                debug!(removed = e.count, "sweep completed");
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = e.caller.as_deref(), info = reason, "subscriber panicked");
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = e.caller.as_deref(), reason, "subscriber dropped event");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
