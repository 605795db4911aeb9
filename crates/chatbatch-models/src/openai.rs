//! OpenAI model implementation.
//!
//! This module provides an implementation of the `Model` trait for OpenAI's
//! chat-completions API and any server that speaks the same wire format.

use async_trait::async_trait;
use chatbatch_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, error};

/// Base URL of the public OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI model implementation.
#[derive(Debug, Clone)]
pub struct OpenAIModel {
    /// The model ID (e.g., "gpt-4o-mini").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the OpenAI API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAIModel {
    /// Creates a new `OpenAIModel` with the given model ID.
    ///
    /// Reads `OPENAI_API_KEY`, and `OPENAI_BASE_URL` when set.
    ///
    /// # Errors
    /// Returns a `ModelError` if the API key is not found in environment variables.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ModelError::UnsupportedModelProvider(
                "OPENAI_API_KEY environment variable not set".to_string(),
            )
        })?;
        let base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self::with_base_url(model_id, api_key, base_url))
    }

    /// Creates a new `OpenAIModel` with a custom API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self::with_base_url(model_id, api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Creates a new `OpenAIModel` against a custom endpoint.
    ///
    /// # Arguments
    /// * `model_id` - The model ID to request
    /// * `api_key` - The API key for authentication
    /// * `base_url` - The API root, without the `/chat/completions` suffix
    #[must_use]
    pub fn with_base_url(model_id: String, api_key: String, base_url: String) -> Self {
        Self {
            model_id,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Points this client at a different API root.
    #[must_use]
    pub fn at_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> OpenAIRequest<'a> {
        let mut request_body = OpenAIRequest {
            model: &self.model_id,
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            extra: serde_json::Map::new(),
        };

        if let Some(params) = parameters {
            request_body.temperature = params.temperature;
            request_body.top_p = params.top_p;
            request_body.max_tokens = params.max_tokens;
            request_body.stop = params.stop_sequences;
            request_body.extra = params.extra;
        }

        request_body
    }

    /// Maps a non-success HTTP status to a `ModelError`.
    fn status_error(status: StatusCode, error_text: String) -> ModelError {
        if status == StatusCode::PAYMENT_REQUIRED || status == StatusCode::TOO_MANY_REQUESTS {
            return ModelError::QuotaExceeded {
                provider: "openai".to_string(),
                message: Some(error_text),
            };
        }
        ModelError::ModelResponseError(format!("API error ({status}): {error_text}"))
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            message_count = messages.len(),
            parameters = ?parameters,
            "OpenAIModel generating chat completion"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let request_body = self.build_request(messages, parameters);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to OpenAI API");
                ModelError::RequestError(format!("Network error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                error = %error_text,
                "OpenAI API returned error status"
            );
            return Err(Self::status_error(status, error_text));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse OpenAI API response");
            ModelError::SerializationError(format!("Failed to parse response: {e}"))
        })?;

        let content = openai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| {
                error!("No content in OpenAI API response");
                ModelError::ModelResponseError("No content in API response".to_string())
            })?;

        let usage = openai_response.usage.map(|u| ModelUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let model_id = openai_response
            .model
            .unwrap_or_else(|| self.model_id.clone());

        Ok(ModelResponse {
            content,
            model_id: Some(model_id),
            usage,
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)] // Matches API naming
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_model_creation_with_api_key() {
        let model = OpenAIModel::with_api_key("gpt-4o-mini".to_string(), "test-key".to_string());
        assert_eq!(model.model_id(), "gpt-4o-mini");
        assert_eq!(model.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let model = OpenAIModel::with_base_url(
            "m".to_string(),
            "k".to_string(),
            "http://localhost:8000/v1/".to_string(),
        );
        assert_eq!(model.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_request_body_applies_parameters_and_extra() {
        let model = OpenAIModel::with_api_key("gpt-4o-mini".to_string(), "k".to_string());
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let mut extra = serde_json::Map::new();
        extra.insert("seed".to_string(), json!(7));
        let params = ModelParameters {
            temperature: Some(0.5),
            max_tokens: Some(32),
            stop_sequences: Some(vec!["\n".to_string()]),
            extra,
            ..ModelParameters::default()
        };

        let request = model.build_request(&messages, Some(params));
        let body = serde_json::to_value(request).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 32);
        assert_eq!(body["stop"], json!(["\n"]));
        assert_eq!(body["seed"], 7);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            OpenAIModel::status_error(StatusCode::TOO_MANY_REQUESTS, "rate limit".to_string()),
            ModelError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            OpenAIModel::status_error(StatusCode::PAYMENT_REQUIRED, String::new()),
            ModelError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            OpenAIModel::status_error(StatusCode::BAD_GATEWAY, "upstream".to_string()),
            ModelError::ModelResponseError(_)
        ));
    }
}
