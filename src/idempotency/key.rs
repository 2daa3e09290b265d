//! # Idempotency keys.
//!
//! An [`IdempotencyKey`] identifies one *logical* operation: it must be identical across
//! retries of the same submission and different across distinct submissions. Keys are
//! built from three components:
//!
//! ```text
//! <resource_type>:<caller>:<natural_key>
//! ```
//!
//! Components are escaped (`%` → `%25`, `:` → `%3A`) so that no two component triples
//! produce the same key. The natural key is selected by [`NaturalKey`]:
//! - [`NaturalKey::ClientIdOrContent`] the client-supplied id when present, otherwise a
//!   SHA-256 content hash of the payload fields (minus ignored ones);
//! - [`NaturalKey::Fields`] a content hash of an explicit subset of fields.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Deterministic identifier of a logical operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps a caller-provided key verbatim.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Derives a key from resource type, caller identity and natural key.
    ///
    /// # Example
    /// ```
    /// use submitvisor::IdempotencyKey;
    ///
    /// let a = IdempotencyKey::derive("survey", "alice", "42");
    /// let b = IdempotencyKey::derive("survey", "alice", "42");
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str(), "survey:alice:42");
    /// assert_ne!(a, IdempotencyKey::derive("survey", "alice:4", "2"));
    /// ```
    pub fn derive(resource_type: &str, caller: &str, natural_key: &str) -> Self {
        Self(format!(
            "{}:{}:{}",
            escape(resource_type),
            escape(caller),
            escape(natural_key)
        ))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for IdempotencyKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace(':', "%3A")
}

/// Selection of the fields that make up a submission's business-level natural key.
///
/// Whether two submissions differing only by a volatile field (e.g. a client timestamp)
/// are the same logical operation is a deployment choice: list such fields in `ignore`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum NaturalKey {
    /// Use the client-supplied id when present, otherwise hash every field not in `ignore`.
    ClientIdOrContent {
        /// Fields excluded from the content hash.
        #[serde(default)]
        ignore: Vec<String>,
    },
    /// Hash only the listed fields (missing fields hash as `null`).
    Fields {
        /// Field names forming the natural key.
        fields: Vec<String>,
    },
}

impl Default for NaturalKey {
    fn default() -> Self {
        NaturalKey::ClientIdOrContent { ignore: Vec::new() }
    }
}

impl NaturalKey {
    /// Computes the natural key component for a payload.
    pub fn resolve(&self, client_id: Option<&str>, fields: &BTreeMap<String, Value>) -> String {
        match self {
            NaturalKey::ClientIdOrContent { ignore } => match client_id {
                Some(id) if !id.is_empty() => format!("id={id}"),
                _ => {
                    let selected = fields
                        .iter()
                        .filter(|(name, _)| !ignore.iter().any(|i| i == *name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    format!("sha256={}", content_hash(selected))
                }
            },
            NaturalKey::Fields { fields: names } => {
                let selected = names
                    .iter()
                    .map(|name| {
                        let value = fields.get(name).cloned().unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect();
                format!("sha256={}", content_hash(selected))
            }
        }
    }
}

/// SHA-256 over the canonical (key-sorted, compact) JSON encoding of `fields`.
fn content_hash(fields: Map<String, Value>) -> String {
    let canonical = Value::Object(fields).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_escaping_prevents_component_collisions() {
        let a = IdempotencyKey::derive("a:b", "c", "d");
        let b = IdempotencyKey::derive("a", "b:c", "d");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "a%3Ab:c:d");
    }

    #[test]
    fn test_client_id_wins_over_content() {
        let nk = NaturalKey::default();
        let one = payload(&[("score", json!(1))]);
        let two = payload(&[("score", json!(2))]);
        assert_eq!(nk.resolve(Some("c-1"), &one), nk.resolve(Some("c-1"), &two));
        assert_eq!(nk.resolve(Some("c-1"), &one), "id=c-1");
    }

    #[test]
    fn test_content_hash_is_order_independent_and_stable() {
        let nk = NaturalKey::default();
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), json!({"y": 1, "x": 2}));
        a.insert("a".to_string(), json!("v"));
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), json!("v"));
        b.insert("b".to_string(), json!({"x": 2, "y": 1}));
        assert_eq!(nk.resolve(None, &a), nk.resolve(None, &b));
        assert!(nk.resolve(None, &a).starts_with("sha256="));
    }

    #[test]
    fn test_empty_client_id_falls_back_to_content() {
        let nk = NaturalKey::default();
        let p = payload(&[("score", json!(1))]);
        assert_eq!(nk.resolve(Some(""), &p), nk.resolve(None, &p));
    }

    #[test]
    fn test_ignored_fields_do_not_change_key() {
        let nk = NaturalKey::ClientIdOrContent {
            ignore: vec!["submitted_at".into()],
        };
        let a = payload(&[("score", json!(3)), ("submitted_at", json!("10:00"))]);
        let b = payload(&[("score", json!(3)), ("submitted_at", json!("10:01"))]);
        assert_eq!(nk.resolve(None, &a), nk.resolve(None, &b));

        let strict = NaturalKey::default();
        assert_ne!(strict.resolve(None, &a), strict.resolve(None, &b));
    }

    #[test]
    fn test_selected_fields() {
        let nk = NaturalKey::Fields {
            fields: vec!["email".into()],
        };
        let a = payload(&[("email", json!("a@x")), ("note", json!("hi"))]);
        let b = payload(&[("email", json!("a@x")), ("note", json!("bye"))]);
        let c = payload(&[("email", json!("b@x"))]);
        assert_eq!(nk.resolve(None, &a), nk.resolve(None, &b));
        assert_ne!(nk.resolve(None, &a), nk.resolve(None, &c));
    }
}
