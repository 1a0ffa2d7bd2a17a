//! Repository trait for the concept graph
//!
//! The ingestion side of the system writes concepts, their co-occurrence
//! edges and their content links through this trait. Community detection
//! reads the same tables through the clustering engine.

use async_trait::async_trait;

use crate::error::Result;

use super::concept::Concept;
use super::relationship::ConceptRelationship;

/// Repository trait for concept graph persistence
#[async_trait]
pub trait ConceptRepository: Send + Sync {
    /// Save a concept, merging with an existing concept of the same canonical
    /// value in the scope. Returns the stored concept.
    async fn save_concept(&self, concept: &Concept) -> Result<Concept>;

    /// Get a concept by ID
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>>;

    /// Find a concept by its raw or canonical value
    async fn find_concept_by_value(&self, scope_id: &str, value: &str) -> Result<Option<Concept>>;

    /// List all concepts of a scope
    async fn list_concepts(&self, scope_id: &str) -> Result<Vec<Concept>>;

    /// Count concepts of a scope
    async fn count_concepts(&self, scope_id: &str) -> Result<u64>;

    /// Record that two concepts co-occurred, adding `weight` to their edge
    async fn record_cooccurrence(
        &self,
        scope_id: &str,
        a: &str,
        b: &str,
        weight: f64,
    ) -> Result<ConceptRelationship>;

    /// List every edge touching a concept
    async fn list_relationships_for_concept(&self, concept_id: &str) -> Result<Vec<ConceptRelationship>>;

    /// Count edges of a scope
    async fn count_relationships(&self, scope_id: &str) -> Result<u64>;

    /// Link a concept to the content it was extracted from
    async fn link_concept_to_content(
        &self,
        scope_id: &str,
        content_id: &str,
        content_type: &str,
        concept_id: &str,
    ) -> Result<()>;

    /// List concepts extracted from a piece of content
    async fn concepts_for_content(&self, content_id: &str, content_type: &str) -> Result<Vec<Concept>>;
}
