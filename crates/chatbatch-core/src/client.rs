//! Caller-facing facade over the batch dispatcher.

use crate::batch::{BatchDispatcher, DispatchOptions, GenerationOptions, UsageSummary};
use crate::error::Result;
use chatbatch_abstraction::{ChatMessage, Model};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Sends batches of conversations to one remote chat model and returns the texts.
///
/// The client is constructed once and shared; it owns no global state.
#[derive(Debug, Clone)]
pub struct ChatBatchClient {
    dispatcher: BatchDispatcher,
    options: DispatchOptions,
}

impl ChatBatchClient {
    /// Create a client with default dispatch options.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            dispatcher: BatchDispatcher::new(model),
            options: DispatchOptions::default(),
        }
    }

    /// Replaces the dispatch options used for every batch.
    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// The dispatch options used for every batch.
    pub const fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// The underlying dispatcher.
    pub const fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    /// Sends the conversations concurrently and returns the generated texts in order.
    ///
    /// `generation` replaces the client's default generation options for this batch.
    /// Fail-fast: one failed conversation fails the whole call.
    ///
    /// # Errors
    /// See [`BatchDispatcher::dispatch`].
    pub async fn batch_generate_chat_response<P>(
        &self,
        conversations: &[P],
        generation: Option<GenerationOptions>,
    ) -> Result<Vec<String>>
    where
        P: AsRef<[ChatMessage]> + Sync,
    {
        let (texts, _) = self
            .batch_generate_chat_response_with_usage(conversations, generation)
            .await?;
        Ok(texts)
    }

    /// Like [`ChatBatchClient::batch_generate_chat_response`], also returning the
    /// aggregated token usage.
    ///
    /// # Errors
    /// See [`BatchDispatcher::dispatch`].
    pub async fn batch_generate_chat_response_with_usage<P>(
        &self,
        conversations: &[P],
        generation: Option<GenerationOptions>,
    ) -> Result<(Vec<String>, UsageSummary)>
    where
        P: AsRef<[ChatMessage]> + Sync,
    {
        let options = match generation {
            Some(generation) => self.options.clone().with_generation(generation),
            None => self.options.clone(),
        };

        let responses = self.dispatcher.dispatch(conversations, &options).await?;

        let mut usage = UsageSummary::default();
        for response in &responses {
            if let Some(u) = &response.usage {
                info!(
                    prompt_tokens = u.prompt_tokens,
                    completion_tokens = u.completion_tokens,
                    total_tokens = u.total_tokens,
                    "Response usage"
                );
            }
            usage.record(response.usage.as_ref());
        }

        let texts: Vec<String> = responses
            .into_iter()
            .map(|response| response.content)
            .collect();
        Ok((texts, usage))
    }
}

impl fmt::Display for ChatBatchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChatBatchClient(model={})",
            self.dispatcher.model().model_id()
        )
    }
}
