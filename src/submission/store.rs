//! # Collaborator contracts.
//!
//! The pipeline writes through a [`RecordStore`] and checks requests with a
//! [`Validate`] implementation; it implements neither. Both are `async-trait`
//! objects so services can be swapped at construction time.
//!
//! ## Contract
//! - Errors are reported as [`OperationError`]; attach an HTTP-style status
//!   ([`OperationError::status`]) or a category so the classifier can tell
//!   transient failures from request defects.
//! - `RecordStore::create` should enforce uniqueness on
//!   [`Record::idempotency_key`](super::Record::idempotency_key); the in-process
//!   cache cannot survive a crash.

use async_trait::async_trait;

use super::model::{Answer, Record, RecordId, Submission};
use crate::error::OperationError;

/// Record persistence service.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Creates the parent record and returns its id.
    async fn create(&self, record: &Record) -> Result<RecordId, OperationError>;

    /// Creates the child answers of `parent`.
    async fn create_answers(&self, parent: &RecordId, answers: &[Answer])
    -> Result<(), OperationError>;

    /// Deletes a record (used to undo a partially written submission).
    async fn delete(&self, id: &RecordId) -> Result<(), OperationError>;
}

/// Request validation service.
#[async_trait]
pub trait Validate: Send + Sync + 'static {
    /// Checks a submission before anything is written.
    async fn validate(&self, submission: &Submission) -> Result<(), OperationError>;
}

/// Validator accepting every submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl Validate for AcceptAll {
    async fn validate(&self, _submission: &Submission) -> Result<(), OperationError> {
        Ok(())
    }
}
