//! Error types used by the submission pipeline and the operations it drives.
//!
//! This module defines two main error enums:
//!
//! - [`OperationError`]: a single attempt of a caller-supplied operation failed.
//! - [`PipelineError`]: what the pipeline surfaces to its caller once it gives up.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! Retry classification lives in [`policies::classify`](crate::policies).

use std::time::Duration;
use thiserror::Error;

/// Broad classification of an [`OperationError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or rejected input.
    Validation,
    /// Caller lacks permission.
    Unauthorized,
    /// Target resource does not exist.
    NotFound,
    /// Connection-level failure.
    Network,
    /// Attempt (or downstream call) timed out.
    Timeout,
    /// Anything else, classified by status code or message.
    Other,
}

/// # Errors produced by a single attempt of an operation.
///
/// Request defects (`Validation`, `Unauthorized`, `NotFound`, and the matching HTTP
/// statuses) are never retried. Everything else is subject to classification.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The request is malformed; retrying cannot help.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was wrong with the request.
        reason: String,
    },

    /// The caller is not allowed to perform the operation.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Underlying message.
        reason: String,
    },

    /// The target resource does not exist.
    #[error("not found: {reason}")]
    NotFound {
        /// Underlying message.
        reason: String,
    },

    /// The attempt exceeded its timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Connection-level failure (reset, refused, DNS, ...).
    #[error("network error: {reason}")]
    Network {
        /// Underlying message.
        reason: String,
    },

    /// Downstream answered with an explicit status code.
    #[error("status {status}: {reason}")]
    Status {
        /// Numeric status (HTTP-like).
        status: u16,
        /// Underlying message.
        reason: String,
    },

    /// Unclassified failure; only the message is available.
    #[error("{reason}")]
    Other {
        /// Underlying message.
        reason: String,
    },
}

impl OperationError {
    /// Shorthand for [`OperationError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`OperationError::Network`].
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`OperationError::Status`].
    pub fn status(status: u16, reason: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`OperationError::Other`].
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }

    /// Returns the attached status code, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OperationError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the error category.
    ///
    /// Statuses map onto request-defect categories only; every other status is
    /// `Other` and left to the retryable allow-list.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OperationError::Validation { .. } => ErrorCategory::Validation,
            OperationError::Unauthorized { .. } => ErrorCategory::Unauthorized,
            OperationError::NotFound { .. } => ErrorCategory::NotFound,
            OperationError::Timeout { .. } => ErrorCategory::Timeout,
            OperationError::Network { .. } => ErrorCategory::Network,
            OperationError::Status { status, .. } => match status {
                400 | 422 => ErrorCategory::Validation,
                401 | 403 => ErrorCategory::Unauthorized,
                404 => ErrorCategory::NotFound,
                _ => ErrorCategory::Other,
            },
            OperationError::Other { .. } => ErrorCategory::Other,
        }
    }

    /// True when the failure is a defect of the request itself.
    pub fn is_request_defect(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Unauthorized | ErrorCategory::NotFound
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use submitvisor::OperationError;
    ///
    /// let err = OperationError::status(503, "service unavailable");
    /// assert_eq!(err.as_label(), "operation_status");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationError::Validation { .. } => "operation_validation",
            OperationError::Unauthorized { .. } => "operation_unauthorized",
            OperationError::NotFound { .. } => "operation_not_found",
            OperationError::Timeout { .. } => "operation_timeout",
            OperationError::Network { .. } => "operation_network",
            OperationError::Status { .. } => "operation_status",
            OperationError::Other { .. } => "operation_failed",
        }
    }

    /// Returns the bare message without the variant prefix.
    pub fn as_message(&self) -> String {
        match self {
            OperationError::Validation { reason }
            | OperationError::Unauthorized { reason }
            | OperationError::NotFound { reason }
            | OperationError::Network { reason }
            | OperationError::Status { reason, .. }
            | OperationError::Other { reason } => reason.clone(),
            OperationError::Timeout { timeout } => format!("timeout: {timeout:?}"),
        }
    }
}

/// # Errors surfaced by the pipeline.
///
/// Transient failures are resolved internally by retrying; only the final outcome
/// reaches the caller, always with attempt count and elapsed wall time attached.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// The operation failed with a non-retryable error; surfaced immediately.
    #[error("operation rejected after {attempts} attempt(s) in {elapsed:?}: {cause}")]
    NonRetryable {
        /// The error returned by the last attempt.
        cause: OperationError,
        /// Number of attempts performed.
        attempts: u32,
        /// Wall time from the first attempt to the failure.
        elapsed: Duration,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempt(s) in {elapsed:?}: {cause}")]
    ExhaustedRetries {
        /// The error returned by the last attempt.
        cause: OperationError,
        /// Number of attempts performed.
        attempts: u32,
        /// Wall time from the first attempt to the failure.
        elapsed: Duration,
    },

    /// The batch was empty or larger than the configured maximum.
    #[error("batch of {len} item(s) outside bounds 1..={max}")]
    BatchBounds {
        /// Number of submitted items.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The caller exhausted its rate-limit window.
    #[error("caller '{caller}' rate limited; retry after {retry_after:?}")]
    RateLimited {
        /// Caller key that was rejected.
        caller: String,
        /// Time until the caller's window resets.
        retry_after: Duration,
    },
}

impl PipelineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use submitvisor::PipelineError;
    ///
    /// let err = PipelineError::BatchBounds { len: 0, max: 100 };
    /// assert_eq!(err.as_label(), "pipeline_batch_bounds");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PipelineError::NonRetryable { .. } => "pipeline_non_retryable",
            PipelineError::ExhaustedRetries { .. } => "pipeline_exhausted_retries",
            PipelineError::BatchBounds { .. } => "pipeline_batch_bounds",
            PipelineError::RateLimited { .. } => "pipeline_rate_limited",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PipelineError::NonRetryable { cause, attempts, .. } => {
                format!("non-retryable after {attempts} attempt(s): {cause}")
            }
            PipelineError::ExhaustedRetries { cause, attempts, .. } => {
                format!("exhausted after {attempts} attempt(s): {cause}")
            }
            PipelineError::BatchBounds { len, max } => {
                format!("batch size {len} not in 1..={max}")
            }
            PipelineError::RateLimited {
                caller,
                retry_after,
            } => format!("caller={caller} retry_after={retry_after:?}"),
        }
    }

    /// The underlying operation error, if this failure came from an operation.
    pub fn cause(&self) -> Option<&OperationError> {
        match self {
            PipelineError::NonRetryable { cause, .. }
            | PipelineError::ExhaustedRetries { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Number of attempts performed (`0` for boundary rejections).
    pub fn attempts(&self) -> u32 {
        match self {
            PipelineError::NonRetryable { attempts, .. }
            | PipelineError::ExhaustedRetries { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Wall time spent before giving up (`ZERO` for boundary rejections).
    pub fn elapsed(&self) -> Duration {
        match self {
            PipelineError::NonRetryable { elapsed, .. }
            | PipelineError::ExhaustedRetries { elapsed, .. } => *elapsed,
            _ => Duration::ZERO,
        }
    }
}
