//! Community summarization
//!
//! Regenerates name, summary, embedding and rating for stale communities.
//! This is the only place staleness is cleared, and the pass that gives
//! communities the embeddings DRIFT searches over.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{EmbeddingOracle, LlmOracle, StructuredCall, TokenUsage, call_typed};

use super::entity::SummaryUpdate;
use super::repository::CommunityRepository;

const SUMMARY_SYSTEM_PROMPT: &str = "You write reports about communities of related concepts \
extracted from a knowledge base. Given the member concepts and the relationships between \
them, produce a short descriptive name, a summary of what ties the community together, and \
an importance rating from 0 to 10. Respond with JSON only.";

/// Highest rating a summary may carry
pub const MAX_RATING: f32 = 10.0;

/// Report shape expected from the LLM
#[derive(Debug, Clone, Deserialize)]
struct CommunityReport {
    name: String,
    summary: String,
    #[serde(default)]
    rating: f32,
}

/// A community the pass could not refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryFailure {
    pub community_id: String,
    pub error: String,
}

/// Outcome of one summarization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<SummaryFailure>,
    pub token_usage: TokenUsage,
}

/// Refreshes stale community summaries for one scope
pub struct CommunitySummarizer {
    repository: Arc<dyn CommunityRepository>,
    llm: Arc<dyn LlmOracle>,
    embedder: Arc<dyn EmbeddingOracle>,
    batch_size: usize,
    temperature: f32,
}

impl CommunitySummarizer {
    pub fn new(
        repository: Arc<dyn CommunityRepository>,
        llm: Arc<dyn LlmOracle>,
        embedder: Arc<dyn EmbeddingOracle>,
    ) -> Self {
        Self {
            repository,
            llm,
            embedder,
            batch_size: 25,
            temperature: 0.2,
        }
    }

    /// Build a summarizer sized by `communities.summary_batch_size` and
    /// sampling at `llm.temperature`
    pub fn from_config(
        repository: Arc<dyn CommunityRepository>,
        llm: Arc<dyn LlmOracle>,
        embedder: Arc<dyn EmbeddingOracle>,
        config: &Config,
    ) -> Self {
        Self::new(repository, llm, embedder)
            .with_batch_size(config.communities.summary_batch_size)
            .with_temperature(config.llm.temperature)
    }

    /// Maximum communities refreshed per pass
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Refresh up to `batch_size` stale communities. A failing community is
    /// recorded and left stale; the pass continues with the next one.
    pub async fn summarize_stale(&self) -> Result<SummaryReport> {
        let stale = self
            .repository
            .find_stale_communities(self.batch_size)
            .await?;

        let mut report = SummaryReport::default();
        if stale.is_empty() {
            debug!(scope_id = %self.repository.scope_id(), "No stale communities");
            return Ok(report);
        }

        for entry in stale {
            match self.summarize_community(&entry.community_id).await {
                Ok(usage) => {
                    report.token_usage.accumulate(usage.as_ref());
                    report.refreshed.push(entry.community_id);
                }
                Err(e) => {
                    warn!(
                        community_id = %entry.community_id,
                        error = %e,
                        "Community summarization failed"
                    );
                    report.failed.push(SummaryFailure {
                        community_id: entry.community_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            scope_id = %self.repository.scope_id(),
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            tokens = report.token_usage.total(),
            "Community summarization complete"
        );

        Ok(report)
    }

    /// Regenerate one community's summary. Returns the LLM call's usage.
    pub async fn summarize_community(&self, community_id: &str) -> Result<Option<TokenUsage>> {
        let community = self
            .repository
            .find_by_id(community_id)
            .await?
            .ok_or_else(|| Error::CommunityNotFound(community_id.to_string()))?;

        let concepts = self.repository.find_member_key_concepts(community_id).await?;
        let relationships = self.repository.find_member_relationships(community_id).await?;

        let call = StructuredCall::new(
            "community_summary",
            json!({
                "level": community.level,
                "concepts": concepts,
                "relationships": relationships,
            }),
        )
        .with_system_prompt(SUMMARY_SYSTEM_PROMPT)
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "summary": {"type": "string"},
                "rating": {"type": "number"}
            },
            "required": ["name", "summary", "rating"]
        }))
        .with_temperature(self.temperature);

        let (generated, usage): (CommunityReport, _) = call_typed(self.llm.as_ref(), call).await?;
        if generated.summary.trim().is_empty() {
            return Err(Error::malformed("community_summary", "empty summary"));
        }

        let embedding = self.embedder.vectorise_text(&generated.summary).await?;

        self.repository
            .update_summary(SummaryUpdate {
                community_id: community_id.to_string(),
                name: generated.name.trim().to_string(),
                summary: generated.summary,
                embedding,
                rating: clamp_rating(generated.rating),
            })
            .await?;

        debug!(community_id = %community_id, members = concepts.len(), "Community summarized");
        Ok(usage)
    }
}

fn clamp_rating(rating: f32) -> f32 {
    if rating.is_finite() {
        rating.clamp(0.0, MAX_RATING)
    } else {
        0.0
    }
}
