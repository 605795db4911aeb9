//! chatbatch core: concurrent batched chat requests with per-request retry.
//!
//! This crate provides:
//! - Exponential backoff and a bounded retrying invoker
//! - A dispatcher that fans conversations out concurrently and keeps input order
//! - Configuration loading and a caller-facing client
//!
//! # Example
//!
//! ```rust,no_run
//! use chatbatch_abstraction::ChatMessage;
//! use chatbatch_core::{ChatBatchClient, DispatchOptions};
//! use chatbatch_models::{ModelConfig, ModelFactory};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model = ModelFactory::create(ModelConfig::default())?;
//!     let client = ChatBatchClient::new(model).with_options(DispatchOptions::default());
//!     let conversations = vec![vec![ChatMessage::user("Write a haiku about rain.")]];
//!     let texts = client.batch_generate_chat_response(&conversations, None).await?;
//!     println!("{}", texts[0]);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod telemetry;

pub use batch::{
    BackoffPolicy, BatchDispatcher, BatchResult, DispatchOptions, ErrorClass, GenerationOptions,
    RetryingInvoker, StopSequences, UsageSummary, classify,
};
pub use client::ChatBatchClient;
pub use config::{Config, ConfigError};
pub use error::{DispatchError, Result};
