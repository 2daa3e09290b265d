use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::idempotency::{IdempotencyKey, NaturalKey};

/// Field name under which answers take part in the content hash.
pub const ANSWERS_FIELD: &str = "@answers";

/// One client submission: a parent record plus its child answers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Kind of record being created (e.g. `"survey_response"`).
    pub resource_type: String,
    /// Identity of the submitting user.
    pub owner: String,
    /// Client-generated identifier, stable across client retries.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Parent record fields.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Child rows written after the parent.
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Submission {
    /// Creates an empty submission.
    pub fn new(resource_type: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            owner: owner.into(),
            client_id: None,
            fields: BTreeMap::new(),
            answers: Vec::new(),
        }
    }

    /// Sets the client id.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Adds a parent field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds an answer.
    pub fn with_answer(mut self, question: impl Into<String>, value: impl Into<Value>) -> Self {
        self.answers.push(Answer {
            question: question.into(),
            value: value.into(),
        });
        self
    }

    /// Derives the idempotency key of this submission.
    ///
    /// Answers take part in the content hash under [`ANSWERS_FIELD`] unless the
    /// natural key names its fields explicitly.
    pub fn idempotency_key(&self, natural_key: &NaturalKey) -> IdempotencyKey {
        let natural = if self.answers.is_empty() {
            natural_key.resolve(self.client_id.as_deref(), &self.fields)
        } else {
            let mut content = self.fields.clone();
            content.insert(
                ANSWERS_FIELD.to_owned(),
                Value::Array(self.answers.iter().map(Answer::to_value).collect()),
            );
            natural_key.resolve(self.client_id.as_deref(), &content)
        };
        IdempotencyKey::derive(&self.resource_type, &self.owner, &natural)
    }

    /// Parent record written to the store.
    pub fn record(&self, key: Option<&IdempotencyKey>) -> Record {
        Record {
            resource_type: self.resource_type.clone(),
            owner: self.owner.clone(),
            client_id: self.client_id.clone(),
            fields: self.fields.clone(),
            idempotency_key: key.cloned(),
        }
    }
}

/// A child row of a submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Question identifier.
    pub question: String,
    /// Answer payload.
    pub value: Value,
}

impl Answer {
    fn to_value(&self) -> Value {
        json!({ "question": self.question, "value": self.value })
    }
}

/// Parent record handed to [`RecordStore::create`](super::RecordStore::create).
///
/// Carries the idempotency key so the store can enforce uniqueness on it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    /// Kind of record.
    pub resource_type: String,
    /// Submitting user.
    pub owner: String,
    /// Client-generated identifier.
    pub client_id: Option<String>,
    /// Record fields.
    pub fields: BTreeMap<String, Value>,
    /// Key of the logical operation that created the record.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Store-assigned record identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    /// Id of the created parent record.
    pub record_id: RecordId,
    /// Number of answers written.
    pub answers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_take_part_in_key() {
        let nk = NaturalKey::default();
        let a = Submission::new("survey", "alice")
            .with_field("score", 3)
            .with_answer("q1", "yes");
        let b = a.clone();
        let c = a.clone().with_answer("q2", "no");

        assert_eq!(a.idempotency_key(&nk), b.idempotency_key(&nk));
        assert_ne!(a.idempotency_key(&nk), c.idempotency_key(&nk));
        assert!(a.idempotency_key(&nk).as_str().starts_with("survey:alice:sha256="));
    }

    #[test]
    fn test_answer_values_separate_keys() {
        let nk = NaturalKey::default();
        let yes = Submission::new("survey", "alice").with_answer("q1", "yes");
        let no = Submission::new("survey", "alice").with_answer("q1", "no");
        let bare = Submission::new("survey", "alice");
        assert_ne!(yes.idempotency_key(&nk), no.idempotency_key(&nk));
        assert_ne!(yes.idempotency_key(&nk), bare.idempotency_key(&nk));
    }

    #[test]
    fn test_client_id_keys_ignore_payload() {
        let nk = NaturalKey::default();
        let a = Submission::new("survey", "bob")
            .with_client_id("draft-9")
            .with_field("score", 1);
        let b = a.clone().with_field("score", 2);
        assert_eq!(a.idempotency_key(&nk), b.idempotency_key(&nk));
        assert_eq!(a.idempotency_key(&nk).as_str(), "survey:bob:id=draft-9");
    }

    #[test]
    fn test_owner_separates_keys() {
        let nk = NaturalKey::default();
        let a = Submission::new("survey", "alice").with_field("score", 1);
        let b = Submission::new("survey", "bob").with_field("score", 1);
        assert_ne!(a.idempotency_key(&nk), b.idempotency_key(&nk));
    }

    #[test]
    fn test_record_carries_key() {
        let key = IdempotencyKey::new("k");
        let rec = Submission::new("survey", "alice").record(Some(&key));
        assert_eq!(rec.idempotency_key, Some(key));
    }
}
