//! Bounded retry around a single remote call.

use crate::batch::backoff::BackoffPolicy;
use crate::error::{DispatchError, Result};
use chatbatch_abstraction::ModelError;
use std::future::Future;
use tracing::{debug, error, warn};

/// How the invoker treats a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; worth another attempt after backoff.
    Retryable,
    /// Permanent; fail immediately.
    Fatal,
}

/// Classifies a remote-client error.
///
/// Every transport or service-level failure is retryable. Errors that describe the
/// client's own setup cannot be fixed by waiting and are fatal.
#[must_use]
pub const fn classify(error: &ModelError) -> ErrorClass {
    match error {
        ModelError::RequestError(_)
        | ModelError::ModelResponseError(_)
        | ModelError::SerializationError(_)
        | ModelError::QuotaExceeded { .. } => ErrorClass::Retryable,
        ModelError::UnsupportedModelProvider(_) | ModelError::Other(_) => ErrorClass::Fatal,
    }
}

/// Runs one remote call with bounded retry and exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryingInvoker {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryingInvoker {
    /// Create a new invoker.
    ///
    /// # Errors
    /// Returns `DispatchError::Configuration` when `max_attempts` is zero.
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Result<Self> {
        if max_attempts == 0 {
            return Err(DispatchError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// Maximum number of calls per request.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The backoff policy applied between attempts.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Calls `call` until it succeeds, fails fatally, or the attempt bound is hit.
    ///
    /// `index` identifies the request in logs and errors. The backoff sleep only
    /// suspends this future.
    ///
    /// # Errors
    /// `DispatchError::Fatal` for a non-retryable error (after exactly one call for
    /// that error), `DispatchError::RetryExhausted` once `max_attempts` calls failed.
    pub async fn invoke<T, F, Fut>(&self, index: usize, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ModelError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            index,
                            attempts = attempt + 1,
                            "Request succeeded after retrying"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if classify(&error) == ErrorClass::Fatal {
                error!(
                    index,
                    attempt = attempt + 1,
                    error = %error,
                    "Non-retryable error"
                );
                return Err(DispatchError::Fatal {
                    index,
                    source: error,
                });
            }

            if attempt + 1 >= self.max_attempts {
                error!(
                    index,
                    attempts = attempt + 1,
                    error = %error,
                    "Giving up after exhausting all attempts"
                );
                return Err(DispatchError::RetryExhausted {
                    index,
                    attempts: attempt + 1,
                    source: error,
                });
            }

            let wait = self.backoff.delay(attempt);
            warn!(
                index,
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                wait_secs = wait.as_secs_f64(),
                error = %error,
                "Retryable error, waiting before next attempt"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn invoker(max_attempts: u32) -> RetryingInvoker {
        let backoff = BackoffPolicy::new(Duration::from_secs(10));
        RetryingInvoker::new(max_attempts, backoff).unwrap()
    }

    #[test]
    fn test_classify() {
        let retryable = [
            ModelError::RequestError(String::new()),
            ModelError::ModelResponseError(String::new()),
            ModelError::SerializationError(String::new()),
            ModelError::QuotaExceeded {
                provider: "openai".to_string(),
                message: None,
            },
        ];
        for error in &retryable {
            assert_eq!(classify(error), ErrorClass::Retryable, "{error}");
        }

        let fatal = [
            ModelError::UnsupportedModelProvider(String::new()),
            ModelError::Other(String::new()),
        ];
        for error in &fatal {
            assert_eq!(classify(error), ErrorClass::Fatal, "{error}");
        }
    }

    #[test]
    fn test_zero_attempts_is_configuration_error() {
        let err = RetryingInvoker::new(0, BackoffPolicy::default()).unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let value = invoker(5)
            .invoke(0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ModelError>("done") }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_retryable_makes_exactly_max_attempts_calls() {
        let calls = AtomicU32::new(0);
        let err = invoker(4)
            .invoke(3, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ModelError::RequestError("reset".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            DispatchError::RetryExhausted {
                index,
                attempts,
                source,
            } => {
                assert_eq!(index, 3);
                assert_eq!(attempts, 4);
                assert_eq!(source, ModelError::RequestError("reset".to_string()));
            }
            other => panic!("Expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_short_circuits() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let err = invoker(5)
            .invoke(0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ModelError::UnsupportedModelProvider("no key".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, DispatchError::Fatal { index: 0, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_double_between_attempts() {
        let start = tokio::time::Instant::now();
        let call_times = std::sync::Mutex::new(Vec::new());
        let result = invoker(4)
            .invoke(0, || {
                let mut times = call_times.lock().unwrap();
                times.push(start.elapsed());
                let n = times.len();
                async move {
                    if n < 4 {
                        Err(ModelError::ModelResponseError("503".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        let times = call_times.into_inner().unwrap();
        let expected = [0, 10, 30, 70].map(Duration::from_secs);
        assert_eq!(times.len(), expected.len());
        for (actual, expected) in times.iter().zip(expected) {
            // The timer wheel rounds deadlines up to the next millisecond.
            assert!(
                *actual >= expected && *actual < expected + Duration::from_millis(10)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_never_sleeps() {
        let start = tokio::time::Instant::now();
        let err = invoker(1)
            .invoke(0, || async {
                Err::<(), _>(ModelError::RequestError("x".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::RetryExhausted { attempts: 1, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
