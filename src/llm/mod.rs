//! Model-calling collaborator used by the map and reduce stages.
//!
//! The pipeline only ever sees the [`ModelClient`] trait: one prompt in, one completion out.
//! Credentials and endpoints are resolved by the caller and handed to the client at
//! construction time, so nothing below reads the environment.

mod openai;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use openai::ChatCompletionsClient;

/// Errors surfaced by a model provider.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Provider could not be reached or answered with a server error.
    #[error("Model provider unavailable: {0}")]
    ModelUnavailable(String),
    /// Provider throttled the request.
    #[error("Model provider rate limited the request: {0}")]
    RateLimited(String),
    /// Credentials were missing or rejected.
    #[error("Invalid credentials for model provider: {0}")]
    InvalidCredentials(String),
    /// Provider answered, but the response could not be used.
    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Model identifier understood by the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one prompt through the model and return its text output.
    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelError>;
}

/// Resolved credentials and endpoints for [`ChatCompletionsClient`].
#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    /// Key for `gpt*` models.
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible base URL for `gpt*` models.
    pub openai_base_url: String,
    /// Key for every other model.
    pub openrouter_api_key: Option<String>,
    /// OpenRouter base URL.
    pub openrouter_base_url: String,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
}
