//! Pipeline events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the orchestrator, the batch
//! coordinator, the pipeline boundary and the background sweeper.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `core::orchestrator`, `core::runner`, `core::batch`,
//!   `Pipeline` (rate limiting, sweeps), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the pipeline's event listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
