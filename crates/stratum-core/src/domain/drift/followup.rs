//! Bounded iterative deepening over follow-up questions
//!
//! The explorer is a worklist: `pending` holds the questions of the current
//! depth. When it runs dry, questions suggested by answers that asked to
//! continue are promoted to the next depth, at most `per_step_cap` of them,
//! and only while `depth + 1 < max_depth`. Questions already asked are never
//! promoted again. Together these cap the number of follow-up calls at
//! `max_depth * per_step_cap`.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use super::types::FollowUpAnswer;

/// Worklist state of the follow-up phase
#[derive(Debug, Clone)]
pub struct FollowUpExplorer {
    pending: VecDeque<String>,
    depth: usize,
    max_depth: usize,
    per_step_cap: usize,
    asked: HashSet<String>,
    answers: Vec<FollowUpAnswer>,
    prior_context: String,
}

impl FollowUpExplorer {
    pub fn new(max_depth: usize, per_step_cap: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            depth: 0,
            max_depth,
            per_step_cap,
            asked: HashSet::new(),
            answers: Vec::new(),
            prior_context: String::new(),
        }
    }

    /// Queue the primer's questions at depth 0. Nothing is queued when
    /// `max_depth` is 0.
    pub fn seed(&mut self, questions: impl IntoIterator<Item = String>) {
        if self.max_depth == 0 {
            return;
        }

        let mut seen = HashSet::new();
        self.pending = questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(q.clone()))
            .take(self.per_step_cap)
            .collect();
        self.depth = 0;
    }

    /// Take the next question and the depth it belongs to
    pub fn next_question(&mut self) -> Option<(String, usize)> {
        let question = self.pending.pop_front()?;
        self.asked.insert(question.clone());
        Some((question, self.depth))
    }

    /// Record an answer, extend the prior-context narrative, and promote the
    /// next depth if the current one is exhausted
    pub fn record(&mut self, answer: FollowUpAnswer) {
        if !self.prior_context.is_empty() {
            self.prior_context.push_str("\n\n");
        }
        self.prior_context
            .push_str(&format!("Q: {}\nA: {}", answer.question, answer.answer));
        self.answers.push(answer);

        if self.pending.is_empty() {
            self.promote();
        }
    }

    fn promote(&mut self) -> bool {
        if self.depth + 1 >= self.max_depth {
            return false;
        }

        let mut seen = HashSet::new();
        let candidates: Vec<String> = self
            .answers
            .iter()
            .filter(|a| a.should_continue)
            .flat_map(|a| a.additional_questions.iter())
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && !self.asked.contains(q) && seen.insert(q.clone()))
            .take(self.per_step_cap)
            .collect();

        if candidates.is_empty() {
            return false;
        }

        self.depth += 1;
        debug!(depth = self.depth, questions = candidates.len(), "Promoted follow-up questions");
        self.pending = candidates.into();
        true
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Q/A narrative of every answered follow-up, oldest first
    pub fn prior_context(&self) -> &str {
        &self.prior_context
    }

    pub fn answers(&self) -> &[FollowUpAnswer] {
        &self.answers
    }

    pub fn into_answers(self) -> Vec<FollowUpAnswer> {
        self.answers
    }
}
