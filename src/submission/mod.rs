//! Submissions and the services they are written through.
//!
//! ## Contents
//! - [`Submission`], [`Answer`] client payload (parent fields plus child answers)
//! - [`Record`], [`RecordId`], [`SubmissionReceipt`] what the store sees and returns
//! - [`RecordStore`], [`Validate`] collaborator contracts ([`AcceptAll`] default)
//! - [`SubmissionWriter`] one validate-then-persist attempt with compensation

mod model;
mod store;
mod writer;

pub use model::{ANSWERS_FIELD, Answer, Record, RecordId, Submission, SubmissionReceipt};
pub use store::{AcceptAll, RecordStore, Validate};
pub use writer::SubmissionWriter;
