//! SQLite-backed clustering engine
//!
//! A projection is a table `projection_<name>` holding a snapshot of one
//! scope's weighted concept edges. It lives until dropped. Clustering is
//! delegated to a [`GraphPartitioner`]; without one the engine reports
//! itself unavailable and detection is skipped.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::community::{ClusterAssignment, ClusteringEngine};
use crate::error::{Error, Result};

const PROJECTION_PREFIX: &str = "projection_";
const MAX_PROJECTION_NAME_LEN: usize = 64;

/// One weighted edge of a projection
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProjectedEdge {
    pub source_id: String,
    pub target_id: String,
    pub weight: f64,
}

/// Snapshot of a scope's concept graph handed to the partitioner
///
/// Nodes are the edge endpoints; concepts without edges are not projected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<ProjectedEdge>,
}

impl ProjectedGraph {
    pub fn from_edges(edges: Vec<ProjectedEdge>) -> Self {
        let nodes: BTreeSet<String> = edges
            .iter()
            .flat_map(|e| [e.source_id.clone(), e.target_id.clone()])
            .collect();

        Self {
            nodes: nodes.into_iter().collect(),
            edges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Community detection algorithm over a projected graph
pub trait GraphPartitioner: Send + Sync {
    /// Assign every node a cluster; higher `resolution` means finer clusters
    fn partition(&self, graph: &ProjectedGraph, resolution: f64) -> Result<Vec<ClusterAssignment>>;
}

/// Clustering engine over the concept tables of a SQLite database
#[derive(Clone)]
pub struct SqliteGraphEngine {
    pool: SqlitePool,
    partitioner: Option<Arc<dyn GraphPartitioner>>,
}

impl SqliteGraphEngine {
    /// Engine without a partitioner; projections work, clustering is unavailable
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            partitioner: None,
        }
    }

    pub fn with_partitioner(mut self, partitioner: Arc<dyn GraphPartitioner>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    /// Names of projections that currently exist
    pub async fn list_projections(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name LIKE 'projection\_%' ESCAPE '\'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name,)| name.strip_prefix(PROJECTION_PREFIX).map(str::to_string))
            .collect())
    }

    /// Edges captured by a projection
    pub async fn projected_graph(&self, projection: &str) -> Result<ProjectedGraph> {
        let table = table_name(projection)?;
        if !self.table_exists(&table).await? {
            return Err(Error::ClusteringFailed(format!(
                "Projection '{}' does not exist",
                projection
            )));
        }

        let sql = format!(
            "SELECT source_id, target_id, weight FROM \"{}\" ORDER BY source_id, target_id",
            table
        );
        let edges: Vec<ProjectedEdge> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(ProjectedGraph::from_edges(edges))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ClusteringEngine for SqliteGraphEngine {
    async fn is_available(&self) -> Result<bool> {
        Ok(self.partitioner.is_some())
    }

    async fn project_concept_graph(&self, projection: &str, scope_id: &str) -> Result<()> {
        let table = table_name(projection)?;
        if self.table_exists(&table).await? {
            return Err(Error::ClusteringFailed(format!(
                "Projection '{}' already exists",
                projection
            )));
        }

        let mut tx = self.pool.begin().await?;

        let create = format!(
            "CREATE TABLE \"{}\" (source_id TEXT NOT NULL, target_id TEXT NOT NULL, weight REAL NOT NULL)",
            table
        );
        sqlx::query(&create).execute(&mut *tx).await?;

        let fill = format!(
            "INSERT INTO \"{}\" (source_id, target_id, weight) \
             SELECT source_id, target_id, weight FROM concept_relationships WHERE scope_id = ?",
            table
        );
        let result = sqlx::query(&fill).bind(scope_id).execute(&mut *tx).await?;

        tx.commit().await?;

        info!(
            projection = %projection,
            scope_id = %scope_id,
            edges = result.rows_affected(),
            "Concept graph projected"
        );
        Ok(())
    }

    async fn stream_clusters(&self, projection: &str, resolution: f64) -> Result<Vec<ClusterAssignment>> {
        let partitioner = self.partitioner.as_ref().ok_or_else(|| {
            Error::ClusteringFailed("No graph partitioner installed".to_string())
        })?;

        let graph = self.projected_graph(projection).await?;
        if graph.is_empty() {
            debug!(projection = %projection, "Empty projection, no clusters");
            return Ok(Vec::new());
        }

        let assignments = partitioner.partition(&graph, resolution)?;

        debug!(
            projection = %projection,
            resolution,
            nodes = graph.nodes.len(),
            assignments = assignments.len(),
            "Projection clustered"
        );
        Ok(assignments)
    }

    async fn drop_projection(&self, projection: &str) -> Result<()> {
        let table = table_name(projection)?;
        let sql = format!("DROP TABLE IF EXISTS \"{}\"", table);
        sqlx::query(&sql).execute(&self.pool).await?;

        debug!(projection = %projection, "Projection dropped");
        Ok(())
    }
}

/// Validate a projection name and map it to its table
fn table_name(projection: &str) -> Result<String> {
    let valid = !projection.is_empty()
        && projection.len() <= MAX_PROJECTION_NAME_LEN
        && projection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(Error::InvalidProjectionName(projection.to_string()));
    }
    Ok(format!("{}{}", PROJECTION_PREFIX, projection))
}
