// SPDX-License-Identifier: Apache-2.0

//! Error types for YDB driver operations

use std::time::Duration;

use thiserror::Error;

use crate::status::Status;

/// Result type for YDB driver operations
pub type YdbResult<T> = Result<T, YdbError>;

/// Errors surfaced to callers of the driver
#[derive(Debug, Error)]
pub enum YdbError {
    /// Transient failure of a single-attempt call; the caller may retry
    #[error("{operation} failed with a retryable status: {status}")]
    Retryable {
        operation: String,
        #[source]
        status: Status,
    },

    /// Failure that must not be retried
    #[error("{operation} failed: {status}")]
    NonRetryable {
        operation: String,
        #[source]
        status: Status,
    },

    /// Transient failures kept happening until the retry budget ran out
    #[error("{operation} failed after {attempts} attempt(s): {status}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        status: Status,
    },

    /// The cumulative deadline for the operation passed
    #[error("{operation} exceeded its deadline after {elapsed:?}")]
    DeadlineExceeded { operation: String, elapsed: Duration },

    /// A result set hit the per-result row cap and was cut off by the server
    #[error("Result #{index} was truncated to {rows} rows")]
    ResultTruncated { index: usize, rows: usize },

    /// A transport or client could not be built
    #[error("unable to create {resource}: {status}")]
    Construction {
        resource: &'static str,
        #[source]
        status: Status,
    },

    /// The driver was used in a way it does not support
    #[error("{0}")]
    Misuse(String),

    /// Invalid connection URL
    #[error("invalid YDB URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl YdbError {
    /// Whether the caller may retry the failed operation as is
    pub fn is_retryable(&self) -> bool {
        matches!(self, YdbError::Retryable { .. })
    }

    /// Whether the error only signals a truncated result
    pub fn is_truncation(&self) -> bool {
        matches!(self, YdbError::ResultTruncated { .. })
    }

    /// Remote status behind the error, if any
    pub fn status(&self) -> Option<&Status> {
        match self {
            YdbError::Retryable { status, .. }
            | YdbError::NonRetryable { status, .. }
            | YdbError::RetriesExhausted { status, .. }
            | YdbError::Construction { status, .. } => Some(status),
            _ => None,
        }
    }
}
