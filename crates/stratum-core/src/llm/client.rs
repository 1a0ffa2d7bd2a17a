//! OpenRouter-compatible LLM client
//!
//! Provides async HTTP access to chat completions and embeddings, with
//! rate-limit backoff, and implements both oracle traits so the community
//! and DRIFT pipelines can run against a real provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::oracle::{EmbeddingOracle, LlmOracle, StructuredCall, StructuredOutput, TokenUsage};
use super::types::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmResponse, Message,
};

/// OpenRouter API base URL
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Maximum number of attempts for rate-limited requests
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// LLM client for chat completions and embeddings
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("default_model", &self.config.default_model)
            .field("embedding_model", &self.config.embedding_model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL (defaults to OpenRouter)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .ok_or_else(|| Error::LLMError("API key is required".to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            config,
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
        })
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new().config(config).api_key(api_key).build()
    }

    /// Build a client from configuration, resolving the key from the environment
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::LLMError("No API key found in STRATUM_API_KEY or OPENROUTER_API_KEY".into())
            })?;
        Self::new(config, api_key)
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Send a chat completion request, retrying on rate limits
    pub async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.send_chat(request).await {
                Ok(response) => return Ok(response),
                Err(Error::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff,
                        "Rate limited, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Stratum")
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            return handle_error_response(status, response).await;
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        LlmResponse::from_chat_response(chat_response)
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }

    /// Generate an embedding for a single text with the configured model
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: text.to_string(),
        };

        debug!(model = %request.model, chars = text.len(), "Sending embedding request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Stratum")
            .json(&request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            return handle_error_response(status, response).await;
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Failed to parse response: {}", e)))?;

        debug!(
            model = %embedding_response.model,
            tokens = embedding_response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            "Embedding generated"
        );

        embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))
    }
}

#[async_trait]
impl LlmOracle for LlmClient {
    async fn call(&self, call: StructuredCall) -> Result<StructuredOutput> {
        let messages = build_structured_messages(&call)?;
        let request = ChatRequest::new(&self.config.default_model, messages)
            .with_temperature(call.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_json_output();

        let response = self.complete(&request).await?;
        let json_str = extract_json_from_response(&response.content);
        let value: serde_json::Value =
            serde_json::from_str(&json_str).map_err(|e| Error::malformed(call.operation, e))?;

        Ok(StructuredOutput {
            value,
            token_usage: response
                .usage
                .map(|(input, output)| TokenUsage::new(input as u64, output as u64)),
        })
    }
}

#[async_trait]
impl EmbeddingOracle for LlmClient {
    async fn vectorise_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }
}

/// Render a structured call as chat messages
fn build_structured_messages(call: &StructuredCall) -> Result<Vec<Message>> {
    let mut messages: Vec<Message> = call
        .system_prompts
        .iter()
        .map(|p| Message::system(p.as_str()))
        .collect();

    let input = serde_json::to_string_pretty(&call.input)
        .map_err(|e| Error::Other(format!("Failed to serialize LLM input: {}", e)))?;

    let mut user = format!("INPUT:\n{}", input);
    if !call.output_schema.is_null() {
        let schema = serde_json::to_string_pretty(&call.output_schema)
            .map_err(|e| Error::Other(format!("Failed to serialize output schema: {}", e)))?;
        user.push_str(&format!(
            "\n\nRespond with a single JSON object matching this JSON schema:\n{}",
            schema
        ));
    }
    messages.push(Message::user(user));

    Ok(messages)
}

async fn handle_error_response<T>(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> Result<T> {
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 => Err(Error::LLMError("Unauthorized: invalid API key".to_string())),
        429 => Err(Error::RateLimited(extract_retry_after(&body).unwrap_or(60))),
        400 => Err(Error::LLMError(format!("Bad request: {}", body))),
        402 => Err(Error::LLMError("Payment required: insufficient credits".to_string())),
        404 => Err(Error::LLMError(format!("Model or endpoint unavailable: {}", body))),
        500..=599 => Err(Error::LLMError(format!("Server error ({}): {}", status, body))),
        _ => Err(Error::LLMError(format!("HTTP error {}: {}", status, body))),
    }
}

/// Exponential backoff, never shorter than the provider's suggested wait
fn calculate_backoff(attempt: u32, suggested_wait_secs: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    base.max(suggested_wait_secs.saturating_mul(1000))
}

fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}

/// Extract JSON from a response that might be wrapped in markdown fences or prose
pub(crate) fn extract_json_from_response(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let fence_start = start + 3;
        if let Some(newline) = response[fence_start..].find('\n') {
            let json_start = fence_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    response.to_string()
}
