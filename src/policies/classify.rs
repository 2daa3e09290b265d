//! # Retry classification.
//!
//! [`is_retryable`] decides whether a failed attempt is worth repeating. Priority:
//! 1. request defects (validation, authorization, not-found) are never retryable;
//! 2. an attached status code found in the [`RetryableCodes`] allow-list;
//! 3. a named category (`Network`, `Timeout`);
//! 4. a case-insensitive match against [`TRANSIENT_PHRASES`].

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::{ErrorCategory, OperationError};

/// Message fragments that indicate a transient condition.
pub const TRANSIENT_PHRASES: &[&str] = &[
    "network error",
    "timeout",
    "rate limit",
    "service unavailable",
    "internal server error",
    "bad gateway",
    "gateway timeout",
];

/// Status codes retried by default: request timeout, too many requests and the 5xx family.
pub const DEFAULT_RETRYABLE_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Allow-list of status codes considered transient.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RetryableCodes(BTreeSet<u16>);

impl Default for RetryableCodes {
    fn default() -> Self {
        Self(DEFAULT_RETRYABLE_CODES.iter().copied().collect())
    }
}

impl RetryableCodes {
    /// Builds an allow-list from arbitrary codes.
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self(codes.into_iter().collect())
    }

    /// Returns a copy extended with `code`.
    pub fn with(mut self, code: u16) -> Self {
        self.0.insert(code);
        self
    }

    /// True if `code` is in the allow-list.
    pub fn contains(&self, code: u16) -> bool {
        self.0.contains(&code)
    }
}

/// Indicates whether `err` is safe to retry under the given allow-list.
///
/// # Example
/// ```
/// use submitvisor::{OperationError, RetryableCodes, is_retryable};
///
/// let codes = RetryableCodes::default();
/// assert!(is_retryable(&OperationError::status(503, "down"), &codes));
/// assert!(!is_retryable(&OperationError::validation("timeout field missing"), &codes));
/// ```
pub fn is_retryable(err: &OperationError, codes: &RetryableCodes) -> bool {
    if err.is_request_defect() {
        return false;
    }
    if let Some(code) = err.status_code() {
        if codes.contains(code) {
            return true;
        }
    }
    if matches!(err.category(), ErrorCategory::Network | ErrorCategory::Timeout) {
        return true;
    }
    let message = err.as_message().to_lowercase();
    TRANSIENT_PHRASES.iter().any(|p| message.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_codes_are_retryable() {
        let codes = RetryableCodes::default();
        for code in DEFAULT_RETRYABLE_CODES {
            assert!(
                is_retryable(&OperationError::status(*code, "x"), &codes),
                "status {code} should be retryable"
            );
        }
        assert!(!is_retryable(&OperationError::status(409, "conflict"), &codes));
    }

    #[test]
    fn test_custom_codes() {
        let codes = RetryableCodes::new([503]).with(409);
        assert!(is_retryable(&OperationError::status(409, "conflict"), &codes));
        assert!(!is_retryable(&OperationError::status(500, "boom"), &codes));
    }

    #[test]
    fn test_allow_list_decides_timeout_statuses() {
        let codes = RetryableCodes::new([503]);
        assert!(!is_retryable(&OperationError::status(504, "upstream"), &codes));
        assert!(!is_retryable(&OperationError::status(408, "upstream"), &codes));
        assert!(is_retryable(&OperationError::status(503, "upstream"), &codes));
        // message fallback still applies
        assert!(is_retryable(&OperationError::status(504, "gateway timeout"), &codes));
    }

    #[test]
    fn test_categories_are_retryable() {
        let codes = RetryableCodes::new(Vec::<u16>::new());
        assert!(is_retryable(&OperationError::network("connection reset"), &codes));
        assert!(is_retryable(
            &OperationError::Timeout {
                timeout: Duration::from_secs(1)
            },
            &codes
        ));
    }

    #[test]
    fn test_message_phrases_case_insensitive() {
        let codes = RetryableCodes::default();
        assert!(is_retryable(&OperationError::other("Bad Gateway from proxy"), &codes));
        assert!(is_retryable(&OperationError::other("RATE LIMIT exceeded"), &codes));
        assert!(!is_retryable(&OperationError::other("unique violation"), &codes));
    }

    #[test]
    fn test_request_defects_never_retryable() {
        let codes = RetryableCodes::default();
        assert!(!is_retryable(&OperationError::validation("network error in field"), &codes));
        assert!(!is_retryable(
            &OperationError::Unauthorized {
                reason: "service unavailable".into()
            },
            &codes
        ));
        assert!(!is_retryable(&OperationError::status(404, "gateway timeout"), &codes));
        assert!(!is_retryable(&OperationError::status(400, "timeout"), &codes));
    }
}
