//! Community entity types
//!
//! A community is a cluster of related concepts at one hierarchy level.
//! Level 0 is the finest partition; higher levels come from coarser
//! clustering resolutions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted community
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub scope_id: String,
    /// Hierarchy level, 0 = finest
    pub level: u32,
    pub name: String,
    /// Generated summary; `None` until the first summarization pass
    pub summary: Option<String>,
    /// Embedding of the summary, used for vector search
    pub embedding: Option<Vec<f32>>,
    /// Importance rating assigned by the summarizer (0.0 to 10.0)
    pub rating: f32,
    pub member_count: usize,
    /// Summary no longer reflects membership
    pub is_stale: bool,
    pub stale_since: Option<DateTime<Utc>>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Community {
    /// Build a freshly detected community. It has no summary yet, so it
    /// starts out stale.
    pub fn new(scope_id: impl Into<String>, new: NewCommunity) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            scope_id: scope_id.into(),
            level: new.level,
            name: new.name,
            summary: None,
            embedding: None,
            rating: new.rating,
            member_count: new.member_count,
            is_stale: true,
            stale_since: Some(now),
            last_processed_at: None,
            created_at: now,
        }
    }

    /// Whether the community can take part in vector search
    pub fn is_searchable(&self) -> bool {
        self.summary.is_some() && self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Fields supplied when persisting a detected cluster
#[derive(Debug, Clone, PartialEq)]
pub struct NewCommunity {
    pub name: String,
    pub level: u32,
    pub member_count: usize,
    pub rating: f32,
}

/// A community as seen inside one detection run
///
/// Only lives long enough to drive hierarchy construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCommunity {
    pub id: String,
    pub level: u32,
    pub members: BTreeSet<String>,
    pub parent_id: Option<String>,
}

impl DetectedCommunity {
    pub fn new(id: impl Into<String>, level: u32, members: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: id.into(),
            level,
            members: members.into_iter().collect(),
            parent_id: None,
        }
    }
}

/// Candidate community for an orphan concept, with the strength of the
/// orphan's connection into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityAffinity {
    pub community_id: String,
    /// Sum of the weights of edges between the orphan and members
    pub total_weight: f64,
    pub member_count: usize,
    /// Number of edges between the orphan and members
    pub relationship_count: usize,
}

impl CommunityAffinity {
    /// Affinity score: connection strength times breadth, damped by
    /// community size so large communities do not absorb everything.
    pub fn score(&self) -> f64 {
        let size = self.member_count.max(1) as f64;
        self.total_weight * self.relationship_count as f64 / size.sqrt()
    }

    /// A candidate qualifies only when the orphan is actually connected to it
    pub fn qualifies(&self) -> bool {
        self.relationship_count > 0 && self.total_weight > 0.0 && self.score().is_finite()
    }
}

/// Number of communities at one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: u32,
    pub count: u64,
}

/// A member concept with the fields the summarizer and DRIFT need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConcept {
    pub id: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An edge between two members, by concept value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRelationship {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// A community waiting for summarization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleCommunity {
    pub community_id: String,
    pub scope_id: String,
}

/// Regenerated summary fields; persisting one clears staleness
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryUpdate {
    pub community_id: String,
    pub name: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub rating: f32,
}
