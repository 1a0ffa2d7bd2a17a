//! DRIFT search driver
//!
//! Runs the phase machine for one question: HyDE, community search, primer
//! answer, bounded follow-ups, synthesis. The hop ceiling is checked before
//! every transition and forces synthesis once reached. All state lives in a
//! per-call [`SearchRun`]; the engine itself is shared freely.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::DriftConfig;
use crate::domain::community::{Community, CommunityRepository, MemberConcept, MemberRelationship};
use crate::error::{Error, Result};
use crate::llm::{EmbeddingOracle, LlmOracle, StructuredCall, TokenUsage, call_typed};

use super::followup::FollowUpExplorer;
use super::phase::{DriftPhase, TransitionState, next_phase};
use super::prompts::{
    FOLLOW_UP_SYSTEM_PROMPT, HYDE_SYSTEM_PROMPT, NO_CONTEXT_MESSAGE, NO_FOLLOW_UPS_PLACEHOLDER,
    PRIMER_SYSTEM_PROMPT, SYNTHESIS_SYSTEM_PROMPT,
};
use super::types::{DriftOptions, DriftSearchResult, FollowUpAnswer, Termination};

/// Additional questions kept per follow-up answer
const MAX_ADDITIONAL_QUESTIONS: usize = 2;

#[derive(Debug, Deserialize)]
struct HydeOutput {
    hypothetical_answer: String,
}

#[derive(Debug, Deserialize)]
struct PrimerOutput {
    initial_answer: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FollowUpOutput {
    answer: String,
    #[serde(default)]
    additional_questions: Vec<String>,
    #[serde(default)]
    should_continue: bool,
}

#[derive(Debug, Deserialize)]
struct SynthesisOutput {
    final_answer: String,
}

/// Member detail of the leading matched communities
#[derive(Debug, Clone, Default, Serialize)]
struct LocalContext {
    communities: Vec<String>,
    concepts: Vec<MemberConcept>,
    relationships: Vec<MemberRelationship>,
}

/// Mutable state of one search
struct SearchRun {
    question: String,
    top_k: usize,
    hypothetical_answer: Option<String>,
    hyde_embedding: Vec<f32>,
    matched: Vec<Community>,
    initial_answer: Option<String>,
    confidence: Option<f32>,
    explorer: FollowUpExplorer,
    local_context: Option<LocalContext>,
    final_answer: Option<String>,
    token_usage: TokenUsage,
    hops: u32,
    terminated_by: Termination,
}

impl SearchRun {
    fn new(question: &str, top_k: usize, max_depth: usize, per_step_cap: usize) -> Self {
        Self {
            question: question.to_string(),
            top_k,
            hypothetical_answer: None,
            hyde_embedding: Vec::new(),
            matched: Vec::new(),
            initial_answer: None,
            confidence: None,
            explorer: FollowUpExplorer::new(max_depth, per_step_cap),
            local_context: None,
            final_answer: None,
            token_usage: TokenUsage::default(),
            hops: 0,
            terminated_by: Termination::Completed,
        }
    }

    fn transition_state(&self) -> TransitionState {
        TransitionState {
            matched_communities: self.matched.len(),
            pending_questions: self.explorer.pending_len(),
        }
    }

    fn record_usage(&mut self, usage: Option<TokenUsage>) {
        self.token_usage.accumulate(usage.as_ref());
    }

    fn into_result(self) -> DriftSearchResult {
        DriftSearchResult {
            question: self.question,
            hypothetical_answer: self.hypothetical_answer,
            matched_communities: self.matched,
            initial_answer: self.initial_answer,
            confidence: self.confidence,
            follow_up_answers: self.explorer.into_answers(),
            final_answer: self
                .final_answer
                .unwrap_or_else(|| NO_CONTEXT_MESSAGE.to_string()),
            token_usage: self.token_usage,
            hops: self.hops,
            terminated_by: self.terminated_by,
        }
    }
}

/// Answers questions over one scope's community summaries
pub struct DriftSearchEngine {
    repository: Arc<dyn CommunityRepository>,
    llm: Arc<dyn LlmOracle>,
    embedder: Arc<dyn EmbeddingOracle>,
    config: DriftConfig,
}

impl DriftSearchEngine {
    pub fn new(
        repository: Arc<dyn CommunityRepository>,
        llm: Arc<dyn LlmOracle>,
        embedder: Arc<dyn EmbeddingOracle>,
        config: DriftConfig,
    ) -> Self {
        Self {
            repository,
            llm,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Search with the configured bounds
    pub async fn search(&self, question: &str) -> Result<DriftSearchResult> {
        self.search_with_options(question, DriftOptions::default()).await
    }

    /// Search with per-call overrides of `top_k` and `max_depth`
    pub async fn search_with_options(
        &self,
        question: &str,
        options: DriftOptions,
    ) -> Result<DriftSearchResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".to_string()));
        }

        let mut run = SearchRun::new(
            question,
            options.top_k.unwrap_or(self.config.top_k),
            options.max_depth.unwrap_or(self.config.max_depth),
            self.config.per_step_cap,
        );

        info!(
            scope_id = %self.repository.scope_id(),
            top_k = run.top_k,
            "Starting DRIFT search"
        );

        let mut phase = DriftPhase::Hyde;
        while !phase.is_terminal() {
            debug!(phase = %phase, hop = run.hops, "Running DRIFT phase");

            match phase {
                DriftPhase::Hyde => self.hyde(&mut run).await?,
                DriftPhase::CommunitySearch => self.community_search(&mut run).await?,
                DriftPhase::PrimerAnswer => self.primer(&mut run).await?,
                DriftPhase::FollowUp => self.follow_up(&mut run).await?,
                DriftPhase::Synthesis => self.synthesis(&mut run).await?,
                DriftPhase::End => {}
            }
            run.hops += 1;

            let next = next_phase(phase, &run.transition_state());
            phase = if run.hops >= self.config.hop_ceiling
                && !matches!(next, DriftPhase::Synthesis | DriftPhase::End)
            {
                warn!(
                    hops = run.hops,
                    skipped = %next,
                    "DRIFT hop ceiling reached, forcing synthesis"
                );
                run.terminated_by = Termination::HopCeiling;
                DriftPhase::Synthesis
            } else {
                next
            };
        }

        info!(
            hops = run.hops,
            matched = run.matched.len(),
            follow_ups = run.explorer.answers().len(),
            input_tokens = run.token_usage.input_tokens,
            output_tokens = run.token_usage.output_tokens,
            "DRIFT search complete"
        );

        Ok(run.into_result())
    }

    fn structured_call(
        &self,
        operation: &'static str,
        system_prompt: &str,
        input: serde_json::Value,
    ) -> StructuredCall {
        StructuredCall::new(operation, input)
            .with_system_prompt(system_prompt)
            .with_temperature(self.config.temperature)
    }

    async fn hyde(&self, run: &mut SearchRun) -> Result<()> {
        let mut input = json!({ "question": run.question });
        if let Some(example) = self.style_exemplar().await {
            input["example_report"] = json!(example);
        }

        let call = self
            .structured_call("drift_hyde", HYDE_SYSTEM_PROMPT, input)
            .with_output_schema(json!({
                "type": "object",
                "properties": {"hypothetical_answer": {"type": "string"}},
                "required": ["hypothetical_answer"]
            }));
        let (output, usage): (HydeOutput, _) = call_typed(self.llm.as_ref(), call).await?;
        run.record_usage(usage);

        run.hyde_embedding = self
            .embedder
            .vectorise_text(&output.hypothetical_answer)
            .await?;
        run.hypothetical_answer = Some(output.hypothetical_answer);
        Ok(())
    }

    /// A real summary to imitate. Best effort: failures are logged and ignored.
    async fn style_exemplar(&self) -> Option<String> {
        match self.repository.find_by_level(0).await {
            Ok(communities) => communities.into_iter().find_map(|c| c.summary),
            Err(e) => {
                warn!(error = %e, "Could not load a HyDE style exemplar, continuing without one");
                None
            }
        }
    }

    async fn community_search(&self, run: &mut SearchRun) -> Result<()> {
        run.matched = if run.top_k == 0 {
            Vec::new()
        } else {
            self.repository
                .find_by_vector(&run.hyde_embedding, run.top_k)
                .await?
        };

        debug!(matched = run.matched.len(), "Community search complete");
        Ok(())
    }

    async fn primer(&self, run: &mut SearchRun) -> Result<()> {
        let reports = run
            .matched
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "Report {} - {}\n{}",
                    i + 1,
                    c.name,
                    c.summary.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let call = self
            .structured_call(
                "drift_primer",
                PRIMER_SYSTEM_PROMPT,
                json!({ "question": run.question, "community_reports": reports }),
            )
            .with_output_schema(json!({
                "type": "object",
                "properties": {
                    "initial_answer": {"type": "string"},
                    "confidence": {"type": "number"},
                    "follow_up_questions": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["initial_answer", "follow_up_questions"]
            }));
        let (output, usage): (PrimerOutput, _) = call_typed(self.llm.as_ref(), call).await?;
        run.record_usage(usage);

        debug!(
            proposed = output.follow_up_questions.len(),
            "Primer answer received"
        );

        run.initial_answer = Some(output.initial_answer);
        run.confidence = output
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0));
        run.explorer.seed(output.follow_up_questions);
        Ok(())
    }

    async fn follow_up(&self, run: &mut SearchRun) -> Result<()> {
        let Some((question, depth)) = run.explorer.next_question() else {
            return Ok(());
        };

        if run.local_context.is_none() {
            run.local_context = Some(self.load_local_context(&run.matched).await?);
        }

        let call = self
            .structured_call(
                "drift_followup",
                FOLLOW_UP_SYSTEM_PROMPT,
                json!({
                    "question": run.question,
                    "follow_up_question": question,
                    "initial_answer": run.initial_answer,
                    "prior_context": run.explorer.prior_context(),
                    "local_context": run.local_context,
                }),
            )
            .with_output_schema(json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "string"},
                    "additional_questions": {"type": "array", "items": {"type": "string"}},
                    "should_continue": {"type": "boolean"}
                },
                "required": ["answer", "additional_questions", "should_continue"]
            }));
        let (mut output, usage): (FollowUpOutput, _) = call_typed(self.llm.as_ref(), call).await?;
        run.record_usage(usage);

        output.additional_questions.truncate(MAX_ADDITIONAL_QUESTIONS);
        debug!(
            depth,
            should_continue = output.should_continue,
            additional = output.additional_questions.len(),
            "Follow-up answered"
        );

        run.explorer.record(FollowUpAnswer {
            question,
            answer: output.answer,
            depth,
            additional_questions: output.additional_questions,
            should_continue: output.should_continue,
        });
        Ok(())
    }

    async fn load_local_context(&self, matched: &[Community]) -> Result<LocalContext> {
        let mut context = LocalContext::default();
        let mut seen = BTreeSet::new();

        for community in matched.iter().take(self.config.local_context_communities) {
            context.communities.push(community.name.clone());

            for concept in self.repository.find_member_key_concepts(&community.id).await? {
                if seen.insert(concept.id.clone()) {
                    context.concepts.push(concept);
                }
            }
            context
                .relationships
                .extend(self.repository.find_member_relationships(&community.id).await?);
        }

        Ok(context)
    }

    async fn synthesis(&self, run: &mut SearchRun) -> Result<()> {
        if run.matched.is_empty() {
            run.final_answer = Some(
                run.initial_answer
                    .clone()
                    .unwrap_or_else(|| NO_CONTEXT_MESSAGE.to_string()),
            );
            return Ok(());
        }

        let findings = if run.explorer.answers().is_empty() {
            NO_FOLLOW_UPS_PLACEHOLDER.to_string()
        } else {
            run.explorer.prior_context().to_string()
        };

        let call = self
            .structured_call(
                "drift_synthesis",
                SYNTHESIS_SYSTEM_PROMPT,
                json!({
                    "question": run.question,
                    "initial_answer": run.initial_answer.as_deref().unwrap_or_default(),
                    "follow_up_findings": findings,
                }),
            )
            .with_output_schema(json!({
                "type": "object",
                "properties": {"final_answer": {"type": "string"}},
                "required": ["final_answer"]
            }));
        let (output, usage): (SynthesisOutput, _) = call_typed(self.llm.as_ref(), call).await?;
        run.record_usage(usage);

        run.final_answer = Some(output.final_answer);
        Ok(())
    }
}
