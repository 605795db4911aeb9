//! Concurrent batch dispatcher.
//!
//! Fans a list of conversations out to one [`RetryingInvoker`] run each and collects
//! the responses by input position. All invocations of a batch are polled together in
//! the calling task; a backoff sleep in one of them never stalls the others.

use crate::batch::options::DispatchOptions;
use crate::batch::retry::RetryingInvoker;
use crate::batch::types::BatchResult;
use crate::error::{DispatchError, Result};
use chatbatch_abstraction::{ChatMessage, Model, ModelParameters, ModelResponse};
use futures::future::{join_all, try_join_all};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Dispatches batches of chat requests against one shared remote client.
#[derive(Clone)]
pub struct BatchDispatcher {
    model: Arc<dyn Model>,
}

impl std::fmt::Debug for BatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("model_id", &self.model.model_id())
            .finish()
    }
}

impl BatchDispatcher {
    /// Create a dispatcher around a remote client.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// The remote client requests are sent to.
    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    /// Sends every conversation concurrently and returns the responses in input order.
    ///
    /// The batch is fail-fast: the first request that ends in `RetryExhausted` or a
    /// fatal error fails the whole call, and the responses of the other requests are
    /// discarded, including those that already succeeded. Use
    /// [`BatchDispatcher::dispatch_settled`] to keep per-request outcomes instead.
    ///
    /// # Errors
    /// `Configuration` before any remote call if `options` are invalid; otherwise the
    /// first request failure, or `Timeout` if `options.batch_timeout` elapses.
    pub async fn dispatch<P>(
        &self,
        payloads: &[P],
        options: &DispatchOptions,
    ) -> Result<Vec<ModelResponse>>
    where
        P: AsRef<[ChatMessage]> + Sync,
    {
        let (invoker, parameters) = options.prepare()?;
        let start = Instant::now();

        info!(
            model_id = %self.model.model_id(),
            total_requests = payloads.len(),
            max_attempts = invoker.max_attempts(),
            "Starting batch dispatch"
        );

        let calls = payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                self.invoke_one(&invoker, index, payload.as_ref(), &parameters)
            });
        let responses = with_deadline(options.batch_timeout, try_join_all(calls))
            .await??;

        info!(
            model_id = %self.model.model_id(),
            total_requests = responses.len(),
            duration_ms = start.elapsed().as_millis(),
            "Batch dispatch completed"
        );

        Ok(responses)
    }

    /// Sends every conversation concurrently and keeps each request's outcome.
    ///
    /// The returned [`BatchResult`] always has one slot per payload. With a batch
    /// timeout, requests still running at the deadline fill their slot with
    /// `DispatchError::Timeout`.
    ///
    /// # Errors
    /// Only `Configuration`, before any remote call.
    pub async fn dispatch_settled<P>(
        &self,
        payloads: &[P],
        options: &DispatchOptions,
    ) -> Result<BatchResult<ModelResponse>>
    where
        P: AsRef<[ChatMessage]> + Sync,
    {
        let (invoker, parameters) = options.prepare()?;
        let start = Instant::now();

        info!(
            model_id = %self.model.model_id(),
            total_requests = payloads.len(),
            max_attempts = invoker.max_attempts(),
            "Starting settled batch dispatch"
        );

        let calls = payloads.iter().enumerate().map(|(index, payload)| {
            let call = self.invoke_one(&invoker, index, payload.as_ref(), &parameters);
            let deadline = options.batch_timeout;
            async move {
                match with_deadline(deadline, call).await {
                    Ok(outcome) => outcome,
                    Err(timeout) => Err(timeout),
                }
            }
        });
        let result = BatchResult::new(join_all(calls).await, start.elapsed());

        info!(
            model_id = %self.model.model_id(),
            total_requests = result.total_items(),
            successful = result.successful_count(),
            failed = result.failed_count(),
            success_rate = result.success_rate(),
            "Settled batch dispatch completed"
        );

        Ok(result)
    }

    async fn invoke_one(
        &self,
        invoker: &RetryingInvoker,
        index: usize,
        messages: &[ChatMessage],
        parameters: &ModelParameters,
    ) -> Result<ModelResponse> {
        let call = || {
            self.model
                .generate_chat_completion(messages, Some(parameters.clone()))
        };
        let response = invoker.invoke(index, call).await?;

        match &response.usage {
            Some(usage) => debug!(
                index,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Request completed"
            ),
            None => debug!(index, "Request completed without usage data"),
        }

        Ok(response)
    }
}

/// Runs `fut` to completion, or fails with `Timeout` once `limit` elapses.
async fn with_deadline<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DispatchError::Timeout(limit)),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbatch_models::MockModel;

    fn dispatcher() -> BatchDispatcher {
        BatchDispatcher::new(Arc::new(MockModel::new("mock".to_string())))
    }

    #[tokio::test]
    async fn test_dispatch_empty_batch() {
        let payloads: Vec<Vec<ChatMessage>> = Vec::new();
        let responses = dispatcher()
            .dispatch(&payloads, &DispatchOptions::default())
            .await
            .unwrap();
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order_with_mock_model() {
        let payloads: Vec<Vec<ChatMessage>> = (0..8)
            .map(|i| vec![ChatMessage::user(format!("prompt {i}"))])
            .collect();
        let responses = dispatcher()
            .dispatch(&payloads, &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(responses.len(), 8);
        for (i, response) in responses.iter().enumerate() {
            assert_eq!(response.content, format!("Mock response for: prompt {i}"));
        }
    }

    #[tokio::test]
    async fn test_dispatch_settled_all_success() {
        let payloads = vec![vec![ChatMessage::user("a")], vec![ChatMessage::user("b")]];
        let result = dispatcher()
            .dispatch_settled(&payloads, &DispatchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.total_items(), 2);
        assert!(result.is_complete_success());
    }

    #[test]
    fn test_debug_shows_model_id() {
        assert!(format!("{:?}", dispatcher()).contains("mock"));
    }
}
