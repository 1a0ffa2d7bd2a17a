//! LLM integration
//!
//! This module provides:
//! - Oracle traits (`LlmOracle`, `EmbeddingOracle`) the pipelines depend on
//! - Token usage accounting shared by every multi-call pipeline
//! - An OpenRouter-compatible HTTP client implementing both oracles

mod client;
mod oracle;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use oracle::{
    EmbeddingOracle, LlmOracle, StructuredCall, StructuredOutput, TokenUsage, call_typed,
};
pub use types::{ChatRequest, LlmResponse, Message, MessageRole};
