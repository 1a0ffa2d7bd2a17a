//! DRIFT search inputs and results

use serde::{Deserialize, Serialize};

use crate::domain::community::Community;
use crate::llm::TokenUsage;

/// Per-call overrides of the configured search bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftOptions {
    pub top_k: Option<usize>,
    pub max_depth: Option<usize>,
}

impl DriftOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

/// One answered follow-up question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpAnswer {
    pub question: String,
    pub answer: String,
    /// Deepening level the question was asked at, 0-based
    pub depth: usize,
    /// Questions this answer suggested asking next
    pub additional_questions: Vec<String>,
    pub should_continue: bool,
}

/// Why the phase loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every phase ran to its natural end
    Completed,
    /// The hop ceiling forced synthesis early
    HopCeiling,
}

/// Result of a DRIFT search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftSearchResult {
    pub question: String,
    /// The fabricated answer whose embedding drove community search
    pub hypothetical_answer: Option<String>,
    pub matched_communities: Vec<Community>,
    /// Primer answer; `None` when the primer never ran
    pub initial_answer: Option<String>,
    pub confidence: Option<f32>,
    pub follow_up_answers: Vec<FollowUpAnswer>,
    pub final_answer: String,
    /// Sum over every LLM call of the search
    pub token_usage: TokenUsage,
    /// Phases executed
    pub hops: u32,
    pub terminated_by: Termination,
}
