//! Oracle traits consumed by the community and DRIFT pipelines
//!
//! The pipelines never talk HTTP directly. They issue structured calls
//! against [`LlmOracle`] and embed text through [`EmbeddingOracle`], which
//! keeps prompt transport swappable and lets tests script responses.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Token usage for one or more LLM calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input/prompt tokens
    pub input_tokens: u64,
    /// Number of output/completion tokens
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens (input + output)
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Fold another call's usage into this accumulator. Missing usage counts as zero.
    pub fn accumulate(&mut self, usage: Option<&TokenUsage>) {
        if let Some(usage) = usage {
            self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
            self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
        }
    }
}

/// A structured LLM request: system prompts plus a JSON input, answered with
/// JSON that should satisfy `output_schema`.
#[derive(Debug, Clone)]
pub struct StructuredCall {
    /// Stable operation name, used for logging and by scripted oracles
    pub operation: &'static str,
    pub system_prompts: Vec<String>,
    pub input: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub temperature: f32,
}

impl StructuredCall {
    pub fn new(operation: &'static str, input: serde_json::Value) -> Self {
        Self {
            operation,
            system_prompts: Vec::new(),
            input,
            output_schema: serde_json::Value::Null,
            temperature: 0.2,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompts.push(prompt.into());
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Raw structured output of an oracle call
#[derive(Debug, Clone)]
pub struct StructuredOutput {
    pub value: serde_json::Value,
    pub token_usage: Option<TokenUsage>,
}

impl StructuredOutput {
    /// Deserialize the payload into the caller's expected shape
    pub fn parse<T: DeserializeOwned>(&self, operation: &str) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| Error::malformed(operation, e))
    }
}

/// Structured LLM call with token accounting
#[async_trait]
pub trait LlmOracle: Send + Sync {
    async fn call(&self, call: StructuredCall) -> Result<StructuredOutput>;
}

/// Text to vector embedding
#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    async fn vectorise_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Issue a call, parse the payload, and return it with the call's usage
pub async fn call_typed<T: DeserializeOwned>(
    oracle: &dyn LlmOracle,
    call: StructuredCall,
) -> Result<(T, Option<TokenUsage>)> {
    let operation = call.operation;
    let output = oracle.call(call).await?;
    let parsed = output.parse(operation)?;
    Ok((parsed, output.token_usage))
}
