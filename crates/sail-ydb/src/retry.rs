// SPDX-License-Identifier: Apache-2.0

//! Validation of remote call results with bounded retry.
//!
//! Every remote call returns a [`RemoteResult`]. The [`Validator`] classifies
//! it into a [`RetryOutcome`] and either hands back the value or converts the
//! failure into a [`YdbError`] naming the operation that failed.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::OperationProperties;
use crate::error::{YdbError, YdbResult};
use crate::status::{RemoteResult, Status};

/// Classified result of one attempt
#[derive(Debug, PartialEq)]
pub enum RetryOutcome<T> {
    Success(T),
    RetryableFailure { status: Status, attempt: u32 },
    FatalFailure(Status),
}

/// Stateless adapter between remote results and driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    max_attempts: u32,
    deadline: Duration,
}

impl Validator {
    pub fn new(max_retries: u32, deadline: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            deadline,
        }
    }

    pub fn from_properties(properties: &OperationProperties) -> Self {
        Self::new(properties.max_retries, properties.deadline_timeout())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn classify<T>(result: RemoteResult<T>, attempt: u32) -> RetryOutcome<T> {
        match result {
            Ok(value) => RetryOutcome::Success(value),
            Err(status) if status.code.is_retryable() => {
                RetryOutcome::RetryableFailure { status, attempt }
            }
            Err(status) => RetryOutcome::FatalFailure(status),
        }
    }

    /// Run an idempotent operation, retrying transient failures.
    ///
    /// Attempts stop at the retry budget or at the cumulative deadline,
    /// whichever comes first.
    pub async fn run<F, Fut, T>(&self, description: &str, operation: F) -> YdbResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let started = Instant::now();
        let deadline = started + self.deadline;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout_at(deadline, operation()).await {
                Ok(result) => result,
                Err(_) => return Err(Self::deadline_exceeded(description, started)),
            };

            match Self::classify(result, attempt) {
                RetryOutcome::Success(value) => {
                    debug!(
                        "[{}] OK after {} attempt(s) in {:?}",
                        description,
                        attempt,
                        started.elapsed()
                    );
                    return Ok(value);
                }
                RetryOutcome::RetryableFailure { status, attempt }
                    if attempt < self.max_attempts && Instant::now() < deadline =>
                {
                    warn!(
                        "[{}] failed (attempt {}/{}): {}. Retrying",
                        description, attempt, self.max_attempts, status
                    );
                }
                RetryOutcome::RetryableFailure { status, attempt } => {
                    warn!(
                        "[{}] FAILED after {} attempt(s) in {:?}: {}",
                        description,
                        attempt,
                        started.elapsed(),
                        status
                    );
                    return Err(YdbError::RetriesExhausted {
                        operation: description.to_string(),
                        attempts: attempt,
                        status,
                    });
                }
                RetryOutcome::FatalFailure(status) => {
                    warn!(
                        "[{}] FAILED in {:?}: {}",
                        description,
                        started.elapsed(),
                        status
                    );
                    return Err(YdbError::NonRetryable {
                        operation: description.to_string(),
                        status,
                    });
                }
            }
        }
    }

    /// Run an operation exactly once.
    ///
    /// Transient failures surface as [`YdbError::Retryable`] so the caller
    /// can decide whether repeating the operation is safe.
    pub async fn call<Fut, T>(&self, description: &str, operation: Fut) -> YdbResult<T>
    where
        Fut: Future<Output = RemoteResult<T>>,
    {
        self.call_until(description, Instant::now() + self.deadline, operation)
            .await
    }

    /// Run an operation exactly once against an absolute deadline
    pub async fn call_until<Fut, T>(
        &self,
        description: &str,
        deadline: Instant,
        operation: Fut,
    ) -> YdbResult<T>
    where
        Fut: Future<Output = RemoteResult<T>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout_at(deadline, operation).await {
            Ok(result) => result,
            Err(_) => return Err(Self::deadline_exceeded(description, started)),
        };

        match Self::classify(result, 1) {
            RetryOutcome::Success(value) => {
                debug!("[{}] OK in {:?}", description, started.elapsed());
                Ok(value)
            }
            RetryOutcome::RetryableFailure { status, .. } => {
                warn!("[{}] FAILED in {:?}: {}", description, started.elapsed(), status);
                Err(YdbError::Retryable {
                    operation: description.to_string(),
                    status,
                })
            }
            RetryOutcome::FatalFailure(status) => {
                warn!("[{}] FAILED in {:?}: {}", description, started.elapsed(), status);
                Err(YdbError::NonRetryable {
                    operation: description.to_string(),
                    status,
                })
            }
        }
    }

    fn deadline_exceeded(description: &str, started: Instant) -> YdbError {
        let elapsed = started.elapsed();
        warn!("[{}] exceeded its deadline after {:?}", description, elapsed);
        YdbError::DeadlineExceeded {
            operation: description.to_string(),
            elapsed,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_properties(&OperationProperties::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fail(code: StatusCode) -> Status {
        Status::new(code)
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Validator::classify::<u32>(Ok(5), 1),
            RetryOutcome::Success(5)
        );
        assert_eq!(
            Validator::classify::<u32>(Err(fail(StatusCode::TransportUnavailable)), 2),
            RetryOutcome::RetryableFailure {
                status: fail(StatusCode::TransportUnavailable),
                attempt: 2
            }
        );
        assert_eq!(
            Validator::classify::<u32>(Err(fail(StatusCode::Unknown(12))), 1),
            RetryOutcome::FatalFailure(fail(StatusCode::Unknown(12)))
        );
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let validator = Validator::new(3, Duration::from_secs(5));
        let calls = AtomicU32::new(0);

        let result = validator
            .run("Get or create session", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err(fail(StatusCode::ClientDeadlineExceeded))
                    } else {
                        Ok("session")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "session");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let validator = Validator::new(2, Duration::from_secs(5));
        let calls = AtomicU32::new(0);

        let result: YdbResult<()> = validator
            .run("Get or create session", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(fail(StatusCode::ClientResourceExhausted)) }
            })
            .await;

        assert!(matches!(
            result,
            Err(YdbError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let validator = Validator::new(5, Duration::from_secs(5));
        let calls = AtomicU32::new(0);

        let result: YdbResult<()> = validator
            .run("Get or create session", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(fail(StatusCode::Unauthorized)) }
            })
            .await;

        match result {
            Err(YdbError::NonRetryable { operation, status }) => {
                assert_eq!(operation, "Get or create session");
                assert_eq!(status.code, StatusCode::Unauthorized);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cumulative_deadline_is_not_restarted() {
        let validator = Validator::new(10, Duration::from_millis(250));
        let calls = AtomicU32::new(0);

        let result: YdbResult<()> = validator
            .run("Get or create session", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Err(fail(StatusCode::TransportUnavailable))
                }
            })
            .await;

        assert!(matches!(result, Err(YdbError::DeadlineExceeded { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_does_not_retry() {
        let validator = Validator::new(3, Duration::from_secs(5));

        let result: YdbResult<()> = validator
            .call("Execute data query", async {
                Err(fail(StatusCode::Overloaded))
            })
            .await;

        assert!(result.as_ref().is_err_and(YdbError::is_retryable));

        let result = validator.call("Execute data query", async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_share_an_absolute_deadline() {
        let validator = Validator::new(0, Duration::from_secs(60));
        let deadline = Instant::now() + Duration::from_millis(300);
        let step = || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Status>(())
        };

        validator.call_until("Read scan query part", deadline, step()).await.unwrap();
        let result = validator.call_until("Read scan query part", deadline, step()).await;
        assert!(matches!(result, Err(YdbError::DeadlineExceeded { .. })));
    }
}
