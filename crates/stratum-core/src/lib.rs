//! Stratum Core Library
//!
//! This crate provides the core functionality for Stratum, including:
//! - Concept graph storage per scope (SQLite)
//! - Hierarchical community detection over the concept graph
//! - Staleness tracking and incremental community assignment
//! - Community summarization through an LLM oracle
//! - DRIFT search over community summaries
//! - Batch detection across every scope

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::community::{
        BatchDetectionRunner, Community, CommunityDetector, CommunityRepository,
        CommunitySummarizer, StalenessTracker,
    };
    pub use crate::domain::drift::{DriftOptions, DriftSearchEngine, DriftSearchResult};
    pub use crate::error::{Error, Result};
    pub use crate::llm::{EmbeddingOracle, LlmOracle, TokenUsage};
}
