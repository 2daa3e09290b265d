//! # One write attempt of a submission.
//!
//! ```text
//! write(submission, key)
//!   ├─► validator.validate        Err → return (nothing written)
//!   ├─► store.create(record)      Err → return (nothing written)
//!   └─► store.create_answers      Err → store.delete(parent)   best-effort
//!                                         └─ Err → CompensationFailed
//!                                       return original error
//! ```
//!
//! If the attempt is dropped (attempt timeout) between `create` and the compensation,
//! the parent may remain; the store's uniqueness on the idempotency key keeps the
//! next attempt from duplicating it.

use std::sync::Arc;

use super::model::{RecordId, Submission, SubmissionReceipt};
use super::store::{RecordStore, Validate};
use crate::{
    error::OperationError,
    events::{Bus, Event, EventKind},
    idempotency::IdempotencyKey,
};

/// Performs one validate-then-persist attempt of a submission.
#[derive(Clone)]
pub struct SubmissionWriter {
    store: Arc<dyn RecordStore>,
    validator: Arc<dyn Validate>,
    bus: Bus,
}

impl SubmissionWriter {
    /// Creates a writer over `store`.
    pub fn new(store: Arc<dyn RecordStore>, validator: Arc<dyn Validate>, bus: Bus) -> Self {
        Self {
            store,
            validator,
            bus,
        }
    }

    /// Validates and persists `submission`.
    ///
    /// On an answers failure the parent is deleted before the original error is
    /// returned; a failed delete is published as `CompensationFailed`.
    pub async fn write(
        &self,
        submission: &Submission,
        key: Option<&IdempotencyKey>,
    ) -> Result<SubmissionReceipt, OperationError> {
        self.validator.validate(submission).await?;

        let record_id = self.store.create(&submission.record(key)).await?;
        if !submission.answers.is_empty() {
            if let Err(err) = self
                .store
                .create_answers(&record_id, &submission.answers)
                .await
            {
                self.compensate(&record_id, key).await;
                return Err(err);
            }
        }

        Ok(SubmissionReceipt {
            record_id,
            answers: submission.answers.len(),
        })
    }

    async fn compensate(&self, record_id: &RecordId, key: Option<&IdempotencyKey>) {
        if let Err(err) = self.store.delete(record_id).await {
            self.bus.publish(
                Event::new(EventKind::CompensationFailed)
                    .with_key_opt(key.map(IdempotencyKey::as_str))
                    .with_reason(format!("delete {record_id}: {err}")),
            );
        }
    }
}
