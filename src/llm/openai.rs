//! OpenAI-compatible chat-completions adapter.
//!
//! `gpt*` models are sent to the OpenAI endpoint; every other model id goes through OpenRouter
//! with the attribution headers OpenRouter expects. Failures are classified into
//! [`ModelError`] variants and never retried here.

use super::{ModelClient, ModelClientConfig, ModelError, ModelRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const OPENROUTER_REFERER: &str = "http://localhost:3000";
const OPENROUTER_TITLE: &str = "MMSummary";

/// HTTP client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsClient {
    http: Client,
    config: ModelClientConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    OpenAi,
    OpenRouter,
}

impl Route {
    fn for_model(model: &str) -> Self {
        if model.trim().to_lowercase().starts_with("gpt") {
            Self::OpenAi
        } else {
            Self::OpenRouter
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

impl<'a> ChatRequest<'a> {
    /// OpenAI takes `max_completion_tokens` and reasoning models (`gpt-5*`, `o1`, `o3`, ...)
    /// accept only the default temperature, so any other value is left out of the body.
    fn for_route(route: Route, request: &'a ModelRequest) -> Self {
        let (temperature, max_tokens, max_completion_tokens) = match route {
            Route::OpenAi => {
                let fixed = is_reasoning_model(&request.model) && request.temperature != 1.0;
                let temperature = (!fixed).then_some(request.temperature);
                (temperature, None, Some(request.max_output_tokens))
            }
            Route::OpenRouter => (
                Some(request.temperature),
                Some(request.max_output_tokens),
                None,
            ),
        };
        Self {
            model: &request.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature,
            max_tokens,
            max_completion_tokens,
        }
    }
}

fn is_reasoning_model(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    let model = model.strip_prefix("openai/").unwrap_or(&model);
    if model.starts_with("gpt-5") {
        return !model.contains("chat");
    }
    let mut chars = model.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    /// Build a client from already-resolved credentials.
    pub fn new(config: ModelClientConfig) -> Result<Self, ModelError> {
        let http = Client::builder()
            .user_agent("mmsummary/0.1")
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| {
                ModelError::ModelUnavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, route: Route) -> String {
        let base = match route {
            Route::OpenAi => &self.config.openai_base_url,
            Route::OpenRouter => &self.config.openrouter_base_url,
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn api_key(&self, route: Route) -> Option<&str> {
        match route {
            Route::OpenAi => self.config.openai_api_key.as_deref(),
            Route::OpenRouter => self.config.openrouter_api_key.as_deref(),
        }
    }
}

fn classify_status(status: StatusCode, body: String) -> ModelError {
    let detail = format!("provider returned {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::InvalidCredentials(detail),
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited(detail),
        status if status.is_server_error() => ModelError::ModelUnavailable(detail),
        _ => ModelError::InvalidResponse(detail),
    }
}

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelError> {
        let route = Route::for_model(&request.model);
        let api_key = self.api_key(route).ok_or_else(|| {
            ModelError::InvalidCredentials(format!(
                "no API key configured for the {} route (model '{}')",
                route.label(),
                request.model
            ))
        })?;

        let payload = ChatRequest::for_route(route, &request);

        let mut builder = self
            .http
            .post(self.endpoint(route))
            .bearer_auth(api_key)
            .json(&payload);
        if route == Route::OpenRouter {
            builder = builder
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }

        tracing::debug!(
            route = route.label(),
            model = %request.model,
            prompt_chars = request.prompt.len(),
            max_output_tokens = request.max_output_tokens,
            "Invoking model"
        );

        let response = builder.send().await.map_err(|error| {
            ModelError::ModelUnavailable(format!(
                "failed to reach {} endpoint: {error}",
                route.label()
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            ModelError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ModelError::InvalidResponse("completion contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &MockServer, openai_key: Option<&str>) -> ChatCompletionsClient {
        ChatCompletionsClient::new(ModelClientConfig {
            openai_api_key: openai_key.map(str::to_string),
            openai_base_url: server.base_url(),
            openrouter_api_key: Some("or-key".into()),
            openrouter_base_url: format!("{}/openrouter/", server.base_url()),
            request_timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    fn request(model: &str) -> ModelRequest {
        ModelRequest {
            prompt: "Summarize the meeting".into(),
            model: model.into(),
            temperature: 0.0,
            max_output_tokens: 1000,
        }
    }

    #[tokio::test]
    async fn openai_route_returns_trimmed_completion() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_contains("\"model\":\"gpt-4o-mini\"")
                    .body_contains("\"max_completion_tokens\":1000")
                    .body_contains("\"temperature\":0.0");
                then.status(200).json_body(json!({
                    "choices": [{
                        "message": { "role": "assistant", "content": "  Summary text \n" }
                    }]
                }));
            })
            .await;

        let summary = client_for(&server, Some("sk-test"))
            .invoke(request("gpt-4o-mini"))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(summary, "Summary text");
    }

    #[tokio::test]
    async fn other_models_route_through_openrouter_with_attribution() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openrouter/chat/completions")
                    .header("authorization", "Bearer or-key")
                    .header("x-title", OPENROUTER_TITLE);
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "gemma says hi" } }]
                }));
            })
            .await;

        let summary = client_for(&server, None)
            .invoke(request("google/gemma-3-27b-it:free"))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(summary, "gemma says hi");
    }

    #[tokio::test]
    async fn missing_key_fails_without_network_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200);
            })
            .await;

        let error = client_for(&server, None)
            .invoke(request("gpt-5-mini"))
            .await
            .expect_err("missing key");

        mock.assert_hits(0);
        assert!(matches!(error, ModelError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn status_codes_map_to_typed_errors() {
        let server = MockServer::start_async().await;
        let client = client_for(&server, Some("sk-test"));

        for (status, expected) in [
            (401, "credentials"),
            (429, "rate_limited"),
            (503, "unavailable"),
            (400, "invalid_response"),
        ] {
            let mut mock = server
                .mock_async(|when, then| {
                    when.method(POST).path("/chat/completions");
                    then.status(status).body("nope");
                })
                .await;

            let error = client
                .invoke(request("gpt-4o"))
                .await
                .expect_err("error status");
            assert_eq!(kind(&error), expected, "status {status} mapped to {error:?}");
            assert!(error.to_string().contains(&status.to_string()));
            mock.delete_async().await;
        }
    }

    #[tokio::test]
    async fn empty_choices_are_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client_for(&server, Some("sk-test"))
            .invoke(request("gpt-4o"))
            .await
            .expect_err("no choices");
        assert!(matches!(error, ModelError::InvalidResponse(_)));
    }

    fn kind(error: &ModelError) -> &'static str {
        match error {
            ModelError::InvalidCredentials(_) => "credentials",
            ModelError::RateLimited(_) => "rate_limited",
            ModelError::ModelUnavailable(_) => "unavailable",
            ModelError::InvalidResponse(_) => "invalid_response",
        }
    }

    #[tokio::test]
    async fn gpt5_requests_use_completion_token_limit_without_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("\"model\":\"gpt-5-mini\"")
                    .body_contains("\"max_completion_tokens\":1000");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "Minutes" } }]
                }));
            })
            .await;

        let summary = client_for(&server, Some("sk-test"))
            .invoke(request("gpt-5-mini"))
            .await
            .expect("completion");
        mock.assert();
        assert_eq!(summary, "Minutes");

        let request = request("gpt-5-mini");
        let body = serde_json::to_value(ChatRequest::for_route(Route::OpenAi, &request))
            .expect("serialize");
        assert_eq!(body["max_completion_tokens"], 1000);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn payload_shape_follows_route_and_model() {
        let mut default_temperature = request("gpt-5-mini");
        default_temperature.temperature = 1.0;
        let body = serde_json::to_value(ChatRequest::for_route(
            Route::OpenAi,
            &default_temperature,
        ))
        .expect("serialize");
        assert_eq!(body["temperature"], 1.0);

        let openrouter = request("google/gemma-3-27b-it:free");
        let body = serde_json::to_value(ChatRequest::for_route(Route::OpenRouter, &openrouter))
            .expect("serialize");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn reasoning_models_are_recognised() {
        assert!(is_reasoning_model("gpt-5-mini"));
        assert!(is_reasoning_model("GPT-5"));
        assert!(is_reasoning_model("o3-mini"));
        assert!(is_reasoning_model("openai/o1"));
        assert!(!is_reasoning_model("gpt-5-chat-latest"));
        assert!(!is_reasoning_model("gpt-4o-mini"));
        assert!(!is_reasoning_model("openrouter/auto"));
    }

    #[test]
    fn routes_are_chosen_by_model_prefix() {
        assert_eq!(Route::for_model("GPT-4o"), Route::OpenAi);
        assert_eq!(Route::for_model("gpt-5-mini"), Route::OpenAi);
        assert_eq!(Route::for_model("anthropic/claude"), Route::OpenRouter);
    }
}
