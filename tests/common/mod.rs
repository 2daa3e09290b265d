#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use submitvisor::{
    Answer, BackoffPolicy, JitterPolicy, OperationError, PipelineConfig, Record, RecordId,
    RecordStore, RetryPolicy, Submission, Validate,
};

/// In-memory store with scripted failures.
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<HashMap<RecordId, Record>>,
    pub answers: Mutex<HashMap<RecordId, Vec<Answer>>>,
    pub create_failures: Mutex<VecDeque<OperationError>>,
    pub answer_failures: Mutex<VecDeque<OperationError>>,
    pub delete_fails: Mutex<bool>,
    pub down_for: Mutex<HashSet<String>>,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_creates(&self, errors: impl IntoIterator<Item = OperationError>) {
        self.create_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_answers(&self, errors: impl IntoIterator<Item = OperationError>) {
        self.answer_failures.lock().unwrap().extend(errors);
    }

    /// Every create for `client_id` fails with a network error until healed.
    pub fn take_down(&self, client_id: &str) {
        self.down_for.lock().unwrap().insert(client_id.to_owned());
    }

    pub fn heal(&self, client_id: &str) {
        self.down_for.lock().unwrap().remove(client_id);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, record: &Record) -> Result<RecordId, OperationError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(client_id) = &record.client_id {
            if self.down_for.lock().unwrap().contains(client_id) {
                return Err(OperationError::network("connection reset by peer"));
            }
        }
        let id = RecordId(format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.records.lock().unwrap().insert(id.clone(), record.clone());
        Ok(id)
    }

    async fn create_answers(
        &self,
        parent: &RecordId,
        answers: &[Answer],
    ) -> Result<(), OperationError> {
        if let Some(err) = self.answer_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.answers
            .lock()
            .unwrap()
            .insert(parent.clone(), answers.to_vec());
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), OperationError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if *self.delete_fails.lock().unwrap() {
            return Err(OperationError::network("delete timed out"));
        }
        self.records.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Rejects submissions whose `title` field is missing.
pub struct RequireTitle;

#[async_trait]
impl Validate for RequireTitle {
    async fn validate(&self, submission: &Submission) -> Result<(), OperationError> {
        if submission.fields.contains_key("title") {
            Ok(())
        } else {
            Err(OperationError::validation("title is required"))
        }
    }
}

pub fn backoff(base_ms: u64, jitter: JitterPolicy) -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(base_ms),
        max: Duration::from_secs(30),
        multiplier: 2.0,
        jitter,
    }
}

pub fn retry(max_attempts: u32, base_ms: u64) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_backoff(backoff(base_ms, JitterPolicy::None))
}

/// Config without background sweeping and with fast, deterministic backoff.
pub fn quiet_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.sweep_interval = Duration::ZERO;
    cfg.retry = retry(3, 10);
    cfg.batch.retry = cfg.retry.clone();
    cfg.batch.inter_chunk_delay = Duration::from_millis(50);
    cfg
}

pub fn survey(owner: &str, n: usize) -> Submission {
    Submission::new("survey", owner)
        .with_client_id(format!("draft-{n}"))
        .with_field("title", format!("response {n}"))
        .with_answer("q1", n as u64)
}
