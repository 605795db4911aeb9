//! Batch dispatch of chat requests with per-request retry.

pub mod backoff;
pub mod dispatcher;
pub mod options;
pub mod retry;
pub mod types;

pub use backoff::BackoffPolicy;
pub use dispatcher::BatchDispatcher;
pub use options::{DispatchOptions, GenerationOptions, StopSequences};
pub use retry::{ErrorClass, RetryingInvoker, classify};
pub use types::{BatchResult, UsageSummary};
