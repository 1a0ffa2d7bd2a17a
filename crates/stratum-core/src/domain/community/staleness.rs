//! Incremental community maintenance
//!
//! Between full detection runs, new concepts are placed into existing
//! communities by affinity and the touched communities are flagged stale so
//! the next summarization pass regenerates them. Full detection only runs
//! when a scope has no communities at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;

use super::detector::{CommunityDetector, DetectionReport};
use super::entity::CommunityAffinity;
use super::lock::ScopeLocks;
use super::repository::CommunityRepository;

/// An orphan concept placed into a community
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub concept_id: String,
    pub community_id: String,
    pub score: f64,
}

/// Outcome of an incremental assignment pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentReport {
    pub assigned: Vec<Assignment>,
    /// Orphans with no qualifying community
    pub unassigned: Vec<String>,
    /// Communities flagged stale, sorted
    pub marked_stale: Vec<String>,
}

/// Which indexing path ran for a piece of content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum IndexingOutcome {
    /// The scope had no communities, so everything was detected from scratch
    FullDetection(DetectionReport),
    /// Existing communities absorbed the content's new concepts
    Incremental(AssignmentReport),
}

/// Keeps a scope's communities current between detection runs
pub struct StalenessTracker {
    repository: Arc<dyn CommunityRepository>,
    detector: Arc<CommunityDetector>,
    locks: ScopeLocks,
}

impl StalenessTracker {
    /// Build a tracker over the detector's repository, sharing its locks
    pub fn new(detector: Arc<CommunityDetector>) -> Self {
        Self {
            repository: detector.repository(),
            locks: detector.locks().clone(),
            detector,
        }
    }

    pub fn scope_id(&self) -> &str {
        self.repository.scope_id()
    }

    /// Flag every community containing the concept. Returns the flagged ids.
    pub async fn mark_affected_communities_stale(&self, concept_id: &str) -> Result<Vec<String>> {
        let _guard = self.locks.acquire(self.scope_id()).await;

        let ids: Vec<String> = self
            .repository
            .find_communities_by_key_concept(concept_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !ids.is_empty() {
            self.repository.mark_as_stale(&ids).await?;
        }

        debug!(concept_id = %concept_id, communities = ids.len(), "Marked communities stale");
        Ok(ids)
    }

    /// Place a content's orphan concepts into their best communities
    pub async fn assign_key_concepts_to_communities(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<AssignmentReport> {
        let _guard = self.locks.acquire(self.scope_id()).await;
        self.assign_locked(content_id, content_type).await
    }

    /// Full detection for a scope without communities, incremental
    /// assignment otherwise
    pub async fn detect_and_assign_communities(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<IndexingOutcome> {
        let _guard = self.locks.acquire(self.scope_id()).await;

        let levels = self.repository.count_by_level().await?;
        if levels.iter().all(|l| l.count == 0) {
            info!(
                scope_id = %self.scope_id(),
                content_id = %content_id,
                "No communities yet, running full detection"
            );
            let report = self.detector.detect_locked().await?;
            return Ok(IndexingOutcome::FullDetection(report));
        }

        let report = self.assign_locked(content_id, content_type).await?;
        Ok(IndexingOutcome::Incremental(report))
    }

    async fn assign_locked(&self, content_id: &str, content_type: &str) -> Result<AssignmentReport> {
        let orphans = self
            .repository
            .find_orphan_key_concepts_for_content(content_id, content_type)
            .await?;

        let mut report = AssignmentReport::default();
        let mut affected = BTreeSet::new();

        for concept_id in orphans {
            let candidates = self
                .repository
                .find_communities_by_related_key_concepts(&concept_id)
                .await?;

            match best_candidate(&candidates) {
                Some(best) => {
                    self.repository
                        .add_member_to_community(&best.community_id, &concept_id)
                        .await?;
                    affected.insert(best.community_id.clone());
                    report.assigned.push(Assignment {
                        concept_id,
                        community_id: best.community_id.clone(),
                        score: best.score(),
                    });
                }
                None => report.unassigned.push(concept_id),
            }
        }

        report.marked_stale = affected.into_iter().collect();
        if !report.marked_stale.is_empty() {
            self.repository.mark_as_stale(&report.marked_stale).await?;
        }

        info!(
            scope_id = %self.scope_id(),
            content_id = %content_id,
            assigned = report.assigned.len(),
            unassigned = report.unassigned.len(),
            stale = report.marked_stale.len(),
            "Incremental community assignment complete"
        );

        Ok(report)
    }
}

/// Highest-scoring qualifying candidate; equal scores go to the smallest id
fn best_candidate(candidates: &[CommunityAffinity]) -> Option<&CommunityAffinity> {
    candidates
        .iter()
        .filter(|c| c.qualifies())
        .fold(None, |best: Option<&CommunityAffinity>, candidate| match best {
            Some(current)
                if current.score() > candidate.score()
                    || (current.score() == candidate.score()
                        && current.community_id <= candidate.community_id) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        })
}
