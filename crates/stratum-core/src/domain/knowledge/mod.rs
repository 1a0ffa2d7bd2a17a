//! Concept graph
//!
//! Concepts extracted from ingested content, and the weighted co-occurrence
//! edges between them. This is the graph community detection partitions.

mod concept;
mod relationship;
mod repository;

pub use concept::Concept;
pub use relationship::{ConceptRelationship, canonical_pair};
pub use repository::ConceptRepository;
