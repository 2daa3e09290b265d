//! # Run a single attempt of an operation.
//!
//! Executes one attempt with optional timeout and publishes failure events to [`Bus`].
//!
//! - **Execute ONE attempt** with a fresh child cancellation token
//! - **Apply timeout** if configured (wraps execution in `tokio::time::timeout`)
//! - **Publish events** for observability (failed/timeout)
//!
//! ## Event flow
//!
//! ```text
//! Success:
//!   operation(token) → Ok(value)                      (no event; the orchestrator reports)
//!
//! Failure:
//!   operation(token) → Err(e) → publish AttemptFailed
//!
//! Timeout:
//!   timeout exceeded → cancel child → publish TimeoutHit
//!                                   → publish AttemptFailed (timeout)
//!                                   → return OperationError::Timeout
//! ```
//!
//! ## Rules
//! - The per-attempt token is never shared between attempts.
//! - A timed-out attempt's future is dropped; cleanup that must survive cancellation
//!   belongs in the persistence collaborator.

use std::future::Future;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    error::OperationError,
    events::{Bus, Event, EventKind},
};

/// Executes a single attempt of `operation`, publishing failure events to `bus`.
pub(crate) async fn run_once<T, F, Fut>(
    operation: &mut F,
    timeout: Option<Duration>,
    attempt: u32,
    key: Option<&str>,
    bus: &Bus,
) -> Result<T, OperationError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    let token = CancellationToken::new();

    let res = if let Some(dur) = timeout.filter(|d| *d > Duration::ZERO) {
        match time::timeout(dur, operation(token.clone())).await {
            Ok(r) => r,
            Err(_elapsed) => {
                token.cancel();
                publish_timeout(bus, key, dur, attempt);
                Err(OperationError::Timeout { timeout: dur })
            }
        }
    } else {
        operation(token).await
    };

    if let Err(e) = &res {
        publish_failed(bus, key, attempt, e);
    }
    res
}

/// Publishes `AttemptFailed` event with error details.
fn publish_failed(bus: &Bus, key: Option<&str>, attempt: u32, err: &OperationError) {
    bus.publish(
        Event::new(EventKind::AttemptFailed)
            .with_key_opt(key)
            .with_attempt(attempt)
            .with_reason(err.to_string()),
    );
}

/// Publishes `TimeoutHit` event (always followed by `AttemptFailed`).
fn publish_timeout(bus: &Bus, key: Option<&str>, dur: Duration, attempt: u32) {
    bus.publish(
        Event::new(EventKind::TimeoutHit)
            .with_key_opt(key)
            .with_timeout(dur)
            .with_attempt(attempt),
    );
}
