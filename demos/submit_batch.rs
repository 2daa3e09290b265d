//! # Demo: submit_batch
//!
//! Submits a batch of survey responses to a flaky in-memory store and prints the
//! per-item outcome. Pipeline events are logged through [`LogWriter`] + `tracing`.
//!
//! ## Flow
//! ```text
//! submit_batch("10.0.0.7", 8 submissions)
//!   ├─► check_and_consume(caller)        (once)
//!   ├─► chunk #0: items 0..5 concurrently
//!   │     └─► item 3 has no title        → NonRetryable after 1 attempt
//!   ├─► sleep(inter_chunk_delay)
//!   ├─► chunk #1: items 5..8 concurrently
//!   │     └─► store answers 503 twice    → retried with backoff, then succeeds
//!   └─► BatchReport { succeeded: 7, failed: 1 }
//!
//! submit_batch(same submissions) → every successful item replays from the cache
//! ```
//!
//! ## Run
//! ```bash
//! SUBMITVISOR_LOG=debug cargo run --example submit_batch
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use submitvisor::{
    Answer, LogWriter, OperationError, Pipeline, PipelineConfig, Record, RecordId, RecordStore,
    Submission, SubmissionReceipt, Subscribe, Validate,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Store whose answer writes fail with 503 for the first `flaky` calls.
struct FlakyStore {
    next_id: AtomicUsize,
    flaky: AtomicUsize,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn create(&self, record: &Record) -> Result<RecordId, OperationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        println!("[store] create {} for {}", id, record.owner);
        Ok(RecordId(format!("rec-{id}")))
    }

    async fn create_answers(
        &self,
        parent: &RecordId,
        answers: &[Answer],
    ) -> Result<(), OperationError> {
        let left = self.flaky.load(Ordering::Relaxed);
        if left > 0 {
            self.flaky.store(left - 1, Ordering::Relaxed);
            return Err(OperationError::status(503, "service unavailable"));
        }
        println!("[store] {} answers for {parent}", answers.len());
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), OperationError> {
        println!("[store] rollback {id}");
        Ok(())
    }
}

struct RequireTitle;

#[async_trait]
impl Validate for RequireTitle {
    async fn validate(&self, submission: &Submission) -> Result<(), OperationError> {
        match submission.fields.get("title") {
            Some(_) => Ok(()),
            None => Err(OperationError::validation("title is required")),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("SUBMITVISOR_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Configure: environment overrides on top of defaults, short delays for the demo
    let mut cfg = PipelineConfig::from_env()?;
    cfg.retry.backoff.base = Duration::from_millis(100);
    cfg.batch.retry = cfg.retry.clone();
    cfg.batch.inter_chunk_delay = Duration::from_millis(200);

    // 2. Build the pipeline with the logging subscriber and a validator
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let pipeline = Pipeline::<SubmissionReceipt>::builder(cfg)
        .with_subscribers(subs)
        .with_validator(Arc::new(RequireTitle))
        .build();

    let store: Arc<dyn RecordStore> = Arc::new(FlakyStore {
        next_id: AtomicUsize::new(1),
        flaky: AtomicUsize::new(2),
    });

    // 3. Eight responses; #3 is missing its title
    let submissions: Vec<Submission> = (0..8)
        .map(|n| {
            let s = Submission::new("survey_response", "alice")
                .with_client_id(format!("draft-{n}"))
                .with_answer("q1", n);
            if n == 3 {
                s
            } else {
                s.with_field("title", format!("response #{n}"))
            }
        })
        .collect();

    let report = pipeline
        .submit_batch("10.0.0.7", submissions.clone(), Arc::clone(&store))
        .await?;
    println!(
        "[main] status={:?} succeeded={} failed={} elapsed={:?}",
        report.status(),
        report.succeeded,
        report.failed,
        report.elapsed
    );
    for r in report.failures() {
        println!(
            "[main] item {} ({}) failed: {}",
            r.index,
            r.client_id.as_deref().unwrap_or("-"),
            r.error_code.unwrap_or("unknown")
        );
    }

    // 4. The client retries the whole batch: completed items replay
    let again = pipeline
        .submit_batch("10.0.0.7", submissions, store)
        .await?;
    let replayed = again.results.iter().filter(|r| r.replayed).count();
    println!("[main] resubmitted: {replayed} replayed from cache");

    pipeline.shutdown().await;
    Ok(())
}
