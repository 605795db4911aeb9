//! Error types for chatbatch core.

use chatbatch_abstraction::ModelError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the batch dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Invalid or conflicting options, detected before any remote call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every attempt for one request failed with a retryable error.
    #[error("Request {index} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Position of the request in the batch.
        index: usize,
        /// Number of calls made.
        attempts: u32,
        /// The error returned by the last attempt.
        #[source]
        source: ModelError,
    },

    /// The remote client returned an error that is not worth retrying.
    #[error("Request {index} failed with a non-retryable error: {source}")]
    Fatal {
        /// Position of the request in the batch.
        index: usize,
        /// The underlying client error.
        #[source]
        source: ModelError,
    },

    /// The whole batch ran past its deadline.
    #[error("Batch timed out after {0:?}")]
    Timeout(Duration),
}

impl DispatchError {
    /// Returns the batch position this error belongs to, if it is tied to one request.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self {
            Self::RetryExhausted { index, .. } | Self::Fatal { index, .. } => Some(*index),
            Self::Configuration(_) | Self::Timeout(_) => None,
        }
    }

    /// Returns the underlying client error, if any.
    #[must_use]
    pub const fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::RetryExhausted { source, .. } | Self::Fatal { source, .. } => Some(source),
            Self::Configuration(_) | Self::Timeout(_) => None,
        }
    }
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_display() {
        let err = DispatchError::RetryExhausted {
            index: 2,
            attempts: 5,
            source: ModelError::RequestError("connection reset".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("Request 2"));
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("connection reset"));
        assert_eq!(err.index(), Some(2));
    }

    #[test]
    fn test_fatal_keeps_source() {
        use std::error::Error as _;

        let err = DispatchError::Fatal {
            index: 0,
            source: ModelError::UnsupportedModelProvider("no key".to_string()),
        };
        assert!(err.source().is_some());
        assert!(matches!(
            err.model_error(),
            Some(ModelError::UnsupportedModelProvider(_))
        ));
    }

    #[test]
    fn test_configuration_has_no_index() {
        let err = DispatchError::Configuration("max_attempts must be at least 1".to_string());
        assert_eq!(err.index(), None);
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
