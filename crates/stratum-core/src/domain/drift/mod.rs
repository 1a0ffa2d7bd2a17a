//! DRIFT search
//!
//! Answers a question over a scope's community summaries in phases:
//!
//! 1. HyDE: fabricate a report-shaped answer and embed it
//! 2. Community search: nearest summaries to that embedding
//! 3. Primer: broad answer plus follow-up questions from the matched summaries
//! 4. Follow-ups: bounded iterative deepening over member-level detail
//! 5. Synthesis: one final answer from everything gathered
//!
//! ```ignore
//! let engine = DriftSearchEngine::new(repo, llm, embedder, config.drift.clone());
//! let result = engine.search("How do the storage layers relate?").await?;
//! println!("{}", result.final_answer);
//! ```

mod engine;
mod followup;
mod phase;
mod prompts;
mod types;

pub use engine::DriftSearchEngine;
pub use followup::FollowUpExplorer;
pub use phase::{DriftPhase, TransitionState, next_phase};
pub use prompts::{NO_CONTEXT_MESSAGE, NO_FOLLOW_UPS_PLACEHOLDER};
pub use types::{DriftOptions, DriftSearchResult, FollowUpAnswer, Termination};
