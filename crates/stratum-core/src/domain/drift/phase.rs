//! DRIFT phase identifiers and transitions

use serde::{Deserialize, Serialize};

/// Phases of a DRIFT search, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPhase {
    /// Fabricate and embed a hypothetical answer
    Hyde,
    /// Vector search over community summaries
    CommunitySearch,
    /// Broad answer from the matched summaries, plus follow-up questions
    PrimerAnswer,
    /// Answer one pending follow-up question
    FollowUp,
    /// Combine everything into the final answer
    Synthesis,
    End,
}

impl DriftPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hyde => "hyde",
            Self::CommunitySearch => "community_search",
            Self::PrimerAnswer => "primer_answer",
            Self::FollowUp => "follow_up",
            Self::Synthesis => "synthesis",
            Self::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl std::fmt::Display for DriftPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of search state transitions depend on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionState {
    pub matched_communities: usize,
    pub pending_questions: usize,
}

/// Next phase after `current` completes
pub fn next_phase(current: DriftPhase, state: &TransitionState) -> DriftPhase {
    match current {
        DriftPhase::Hyde => DriftPhase::CommunitySearch,
        DriftPhase::CommunitySearch if state.matched_communities == 0 => DriftPhase::Synthesis,
        DriftPhase::CommunitySearch => DriftPhase::PrimerAnswer,
        DriftPhase::PrimerAnswer | DriftPhase::FollowUp if state.pending_questions > 0 => {
            DriftPhase::FollowUp
        }
        DriftPhase::PrimerAnswer | DriftPhase::FollowUp => DriftPhase::Synthesis,
        DriftPhase::Synthesis | DriftPhase::End => DriftPhase::End,
    }
}
