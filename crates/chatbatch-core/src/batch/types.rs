//! Data types for batch dispatch.

use crate::error::{DispatchError, Result};
use chatbatch_abstraction::ModelUsage;
use serde::Serialize;
use std::time::Duration;

/// Per-slot outcome of a settled batch.
#[derive(Debug, Clone)]
pub struct BatchResult<R> {
    /// One outcome per input payload, in input order.
    pub outcomes: Vec<std::result::Result<R, DispatchError>>,
    /// Total duration of the batch.
    pub total_duration: Duration,
}

impl<R> BatchResult<R> {
    /// Create a new batch result.
    pub const fn new(
        outcomes: Vec<std::result::Result<R, DispatchError>>,
        total_duration: Duration,
    ) -> Self {
        Self {
            outcomes,
            total_duration,
        }
    }

    /// Get total number of items processed.
    pub fn total_items(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of slots that succeeded.
    pub fn successful_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_ok())
            .count()
    }

    /// Number of slots that failed.
    pub fn failed_count(&self) -> usize {
        self.total_items() - self.successful_count()
    }

    /// Success rate as a percentage (0.0 to 100.0).
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_items();
        if total == 0 {
            return 0.0;
        }
        (self.successful_count() as f64 / total as f64) * 100.0
    }

    /// Check if all items were successful.
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(std::result::Result::is_ok)
    }

    /// Successful slots with their input positions.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &R)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.as_ref().ok().map(|r| (index, r)))
    }

    /// Failed slots with their input positions.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &DispatchError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.as_ref().err().map(|e| (index, e)))
    }

    /// Applies the fail-fast policy: all values in order, or the lowest-index failure.
    ///
    /// # Errors
    /// Returns the failure of the first failed slot.
    pub fn into_results(self) -> Result<Vec<R>> {
        self.outcomes.into_iter().collect()
    }
}

/// Aggregate token usage over a set of responses.
///
/// Recording is order-independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    /// Responses recorded.
    pub requests: usize,
    /// Responses that carried no usage data.
    pub missing_usage: usize,
    /// Sum of prompt tokens.
    pub prompt_tokens: u64,
    /// Sum of completion tokens.
    pub completion_tokens: u64,
    /// Sum of total tokens.
    pub total_tokens: u64,
}

impl UsageSummary {
    /// Adds one response's usage.
    pub fn record(&mut self, usage: Option<&ModelUsage>) {
        self.requests += 1;
        match usage {
            Some(usage) => {
                self.prompt_tokens += u64::from(usage.prompt_tokens);
                self.completion_tokens += u64::from(usage.completion_tokens);
                self.total_tokens += u64::from(usage.total_tokens);
            }
            None => self.missing_usage += 1,
        }
    }
}

impl<'a> FromIterator<Option<&'a ModelUsage>> for UsageSummary {
    fn from_iter<I: IntoIterator<Item = Option<&'a ModelUsage>>>(iter: I) -> Self {
        let mut summary = Self::default();
        for usage in iter {
            summary.record(usage);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbatch_abstraction::ModelError;

    fn failure(index: usize) -> DispatchError {
        DispatchError::Fatal {
            index,
            source: ModelError::Other("boom".to_string()),
        }
    }

    #[test]
    fn test_counts_and_rate() {
        let outcomes = vec![Ok("a"), Err(failure(1)), Ok("c"), Ok("d")];
        let result: BatchResult<&str> = BatchResult::new(outcomes, Duration::ZERO);
        assert_eq!(result.total_items(), 4);
        assert_eq!(result.successful_count(), 3);
        assert_eq!(result.failed_count(), 1);
        assert!((result.success_rate() - 75.0).abs() < f64::EPSILON);
        assert!(!result.is_complete_success());
        let succeeded: Vec<usize> = result.successes().map(|(i, _)| i).collect();
        let failed: Vec<usize> = result.failures().map(|(i, _)| i).collect();
        assert_eq!(succeeded, vec![0, 2, 3]);
        assert_eq!(failed, vec![1]);
    }

    #[test]
    fn test_empty_result() {
        let result: BatchResult<String> = BatchResult::new(vec![], Duration::ZERO);
        assert_eq!(result.total_items(), 0);
        assert!(result.success_rate().abs() < f64::EPSILON);
        assert!(result.is_complete_success());
        assert_eq!(result.into_results().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_into_results_returns_lowest_index_failure() {
        let outcomes = vec![Ok("a"), Err(failure(1)), Err(failure(2))];
        let result: BatchResult<&str> = BatchResult::new(outcomes, Duration::ZERO);
        assert_eq!(result.into_results().unwrap_err().index(), Some(1));
    }

    #[test]
    fn test_usage_summary_totals() {
        let a = ModelUsage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        };
        let b = ModelUsage {
            prompt_tokens: 5,
            completion_tokens: 5,
            total_tokens: 10,
        };
        let summary: UsageSummary = [Some(&a), None, Some(&b)].into_iter().collect();

        assert_eq!(summary.requests, 3);
        assert_eq!(summary.missing_usage, 1);
        assert_eq!(summary.prompt_tokens, 15);
        assert_eq!(summary.completion_tokens, 7);
        assert_eq!(summary.total_tokens, 22);
    }
}
