//! Options consumed by the batch dispatcher.

use crate::batch::backoff::{BackoffPolicy, DEFAULT_FIRST_WAIT_TIME};
use crate::batch::retry::RetryingInvoker;
use crate::error::{DispatchError, Result};
use chatbatch_abstraction::ModelParameters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of calls made for one request before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Keys the remote client writes itself; passthrough options may not override them.
const RESERVED_KEYS: [&str; 2] = ["model", "messages"];

/// Keys with a typed field of their own; passing them through would send them twice.
const TYPED_KEYS: [&str; 6] = [
    "stop",
    "stop_sequences",
    "max_tokens",
    "max_new_tokens",
    "temperature",
    "top_p",
];

/// Stop sequences, given either as one string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    /// A single stop string.
    One(String),
    /// Several stop strings.
    Many(Vec<String>),
}

impl StopSequences {
    /// Flattens into the list form sent to the remote client.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(stop) => vec![stop],
            Self::Many(stops) => stops,
        }
    }
}

/// Generation options forwarded to the remote client.
///
/// `stop_sequences` and `max_new_tokens` are aliases of `stop` and `max_tokens`.
/// Supplying both spellings of one option is rejected by [`GenerationOptions::normalize`].
/// Unrecognised keys land in `extra` and are forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Alias of `stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<StopSequences>,
    /// Sequences where generation stops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    /// Alias of `max_tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    /// Maximum number of generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling probability mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Anything else, forwarded opaquely.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GenerationOptions {
    /// Sets the stop sequences through the `stop_sequences` spelling.
    #[must_use]
    pub fn with_stop_sequences(mut self, stops: Vec<String>) -> Self {
        self.stop_sequences = Some(StopSequences::Many(stops));
        self
    }

    /// Sets the output limit through the `max_new_tokens` spelling.
    #[must_use]
    pub const fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = Some(max_new_tokens);
        self
    }

    /// Adds an opaque passthrough option.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Resolves aliases into the parameters sent to the remote client.
    ///
    /// # Errors
    /// Returns `DispatchError::Configuration` when both spellings of an option are
    /// given, or when a passthrough key collides with a field the client owns.
    pub fn normalize(&self) -> Result<ModelParameters> {
        if self.stop_sequences.is_some() && self.stop.is_some() {
            return Err(DispatchError::Configuration(
                "both `stop_sequences` and `stop` were given; `stop_sequences` is normalized \
                 into `stop`, so specify only one of them"
                    .to_string(),
            ));
        }
        if self.max_new_tokens.is_some() && self.max_tokens.is_some() {
            return Err(DispatchError::Configuration(
                "both `max_new_tokens` and `max_tokens` were given; `max_new_tokens` is \
                 normalized into `max_tokens`, so specify only one of them"
                    .to_string(),
            ));
        }
        for key in self.extra.keys() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(DispatchError::Configuration(format!(
                    "generation option `{key}` is set by the client and cannot be passed through"
                )));
            }
            if TYPED_KEYS.contains(&key.as_str()) {
                return Err(DispatchError::Configuration(format!(
                    "generation option `{key}` has its own field and cannot be passed through"
                )));
            }
        }

        Ok(ModelParameters {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_new_tokens.or(self.max_tokens),
            stop_sequences: self
                .stop_sequences
                .clone()
                .or_else(|| self.stop.clone())
                .map(StopSequences::into_vec),
            extra: self.extra.clone(),
        })
    }
}

/// Options for one `dispatch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOptions {
    /// Calls made for one request before it fails with `RetryExhausted`.
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubles on each further failure.
    pub first_wait_time: Duration,
    /// Deadline for the whole batch. `None` waits indefinitely.
    pub batch_timeout: Option<Duration>,
    /// Generation options forwarded to the remote client.
    pub generation: GenerationOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            first_wait_time: DEFAULT_FIRST_WAIT_TIME,
            batch_timeout: None,
            generation: GenerationOptions::default(),
        }
    }
}

impl DispatchOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base backoff wait.
    #[must_use]
    pub const fn with_first_wait_time(mut self, first_wait_time: Duration) -> Self {
        self.first_wait_time = first_wait_time;
        self
    }

    /// Sets a deadline for the whole batch.
    #[must_use]
    pub const fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = Some(batch_timeout);
        self
    }

    /// Replaces the generation options.
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    /// Returns the backoff policy these options describe.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.first_wait_time)
    }

    /// Validates the options and builds what a dispatch needs.
    ///
    /// # Errors
    /// Returns `DispatchError::Configuration` for a zero attempt bound or conflicting
    /// generation options.
    pub fn prepare(&self) -> Result<(RetryingInvoker, ModelParameters)> {
        let invoker = RetryingInvoker::new(self.max_attempts, self.backoff())?;
        let parameters = self.generation.normalize()?;
        Ok((invoker, parameters))
    }
}
