//! Pipeline core: orchestration, batching and lifecycle.
//!
//! The public entry point is [`Pipeline`], built with [`PipelineBuilder`] from a
//! [`PipelineConfig`]. The drivers it wires together are public as well so they can
//! be embedded directly.
//!
//! Internal modules:
//! - [`runner`]: executes one attempt with timeout/cancellation and event publishing;
//! - [`orchestrator`]: retries one logical operation with backoff and idempotent replay;
//! - [`batch`]: chunked, isolated processing of a list of items;
//! - [`config`]: settings, JSON and environment loading;
//! - [`pipeline`]: rate-limited boundary, background listener and sweeper.

mod batch;
mod builder;
mod config;
mod orchestrator;
mod pipeline;
mod runner;

pub use batch::{
    BatchConfig, BatchCoordinator, BatchItem, BatchItemResult, BatchReport, BatchStatus, Keyed,
};
pub use builder::PipelineBuilder;
pub use config::{ConfigError, ENV_PREFIX, PipelineConfig};
pub use orchestrator::{Completion, CompletionSource, RetryOrchestrator};
pub use pipeline::Pipeline;
