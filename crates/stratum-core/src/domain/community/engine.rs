//! Clustering engine seam
//!
//! Community detection never partitions graphs itself. It projects the
//! scope's concept graph into a named ephemeral structure inside an engine,
//! asks the engine for cluster assignments at a resolution, and drops the
//! projection. Projections have no expiry, so callers must drop them.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// One node's cluster membership at a given resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub concept_id: String,
    pub cluster_id: i64,
}

impl ClusterAssignment {
    pub fn new(concept_id: impl Into<String>, cluster_id: i64) -> Self {
        Self {
            concept_id: concept_id.into(),
            cluster_id,
        }
    }
}

/// Graph engine exposing a clustering primitive over named projections
#[async_trait]
pub trait ClusteringEngine: Send + Sync {
    /// Whether the clustering primitive is installed
    async fn is_available(&self) -> Result<bool>;

    /// Project a scope's weighted concept graph under `projection`
    async fn project_concept_graph(&self, projection: &str, scope_id: &str) -> Result<()>;

    /// Cluster a projection at `resolution` (higher means finer clusters)
    async fn stream_clusters(&self, projection: &str, resolution: f64) -> Result<Vec<ClusterAssignment>>;

    /// Release a projection. Dropping an unknown projection is not an error.
    async fn drop_projection(&self, projection: &str) -> Result<()>;
}

/// Source of unique tokens for projection names
pub trait TokenSource: Send + Sync {
    fn next_token(&self) -> String;
}

/// Random UUID tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokenSource;

impl TokenSource for UuidTokenSource {
    fn next_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic `<prefix><n>` tokens, counting from 1
#[derive(Debug)]
pub struct SequentialTokenSource {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialTokenSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl TokenSource for SequentialTokenSource {
    fn next_token(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.prefix, n)
    }
}

/// Projection name for one detection level
pub fn projection_name(token: &str) -> String {
    format!("communities_{}", token)
}
