//! Weighted co-occurrence edges between concepts
//!
//! Relationships are the only clustering input besides node identity. They
//! are undirected: the endpoint pair is stored in canonical order
//! (`source_id < target_id`) so the same pair never produces two edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An undirected weighted edge between two concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRelationship {
    pub id: String,
    pub scope_id: String,
    /// Lexicographically smaller endpoint
    pub source_id: String,
    /// Lexicographically larger endpoint
    pub target_id: String,
    /// Accumulated co-occurrence strength
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConceptRelationship {
    /// Create an edge between two concepts, ordering the endpoints
    pub fn new(
        scope_id: impl Into<String>,
        a: impl Into<String>,
        b: impl Into<String>,
        weight: f64,
    ) -> Self {
        let (source_id, target_id) = canonical_pair(a.into(), b.into());
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            scope_id: scope_id.into(),
            source_id,
            target_id,
            weight,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the edge touches a concept
    pub fn involves(&self, concept_id: &str) -> bool {
        self.source_id == concept_id || self.target_id == concept_id
    }

    /// The endpoint opposite to `concept_id`, if the edge touches it
    pub fn other_endpoint(&self, concept_id: &str) -> Option<&str> {
        if self.source_id == concept_id {
            Some(&self.target_id)
        } else if self.target_id == concept_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Order an endpoint pair so the smaller id comes first
pub fn canonical_pair(a: String, b: String) -> (String, String) {
    if a <= b { (a, b) } else { (b, a) }
}
