//! Concept nodes of the knowledge graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A concept extracted from ingested content
///
/// Concepts are the nodes the clustering step partitions. Each concept is
/// scoped to a tenant and carries a canonical value for deduplication, so
/// "Tokio", "tokio" and "tokio!" resolve to the same node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    /// Tenant the concept belongs to
    pub scope_id: String,
    /// Human-readable value as first observed
    pub value: String,
    /// Normalized value (lowercase, no punctuation, single spaces)
    pub canonical_value: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Create a new concept in a scope
    pub fn new(scope_id: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let canonical_value = Self::canonicalize(&value);
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            scope_id: scope_id.into(),
            value,
            canonical_value,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Use a caller-chosen id instead of a generated one
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Canonicalize a value for deduplication
    ///
    /// Converts to lowercase, removes special characters, and normalizes whitespace
    pub fn canonicalize(value: &str) -> String {
        value
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Check whether a raw value refers to this concept
    pub fn matches_value(&self, query: &str) -> bool {
        self.canonical_value == Self::canonicalize(query)
    }
}
